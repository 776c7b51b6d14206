//! Human-readable renderings of a `NormalizedResult`.

use super::models::{ModelFamily, display_names_for};
use super::result::{Annotations, FitStats, NormalizedResult};

/// Formats like C's `%.{precision}g`: shortest of fixed and scientific,
/// trailing zeros removed.
pub fn format_g(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_owned();
    }
    let precision = precision.max(1);

    // Rounding decides the exponent, so take it from the scientific form.
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            strip_trailing_zeros(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, value)).to_owned()
    }
}

fn strip_trailing_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn reduced_chi2_text(stats: &FitStats, decimals: usize) -> String {
    match stats.reduced_chi2() {
        Some(reduced) => format!("{:.*}", decimals, reduced),
        None => "N/A".to_owned(),
    }
}

fn name_or(names: &[String], index: usize, fallback: impl FnOnce() -> String) -> String {
    names.get(index).cloned().unwrap_or_else(fallback)
}

/// Multi-line report of one fit.
pub fn format_full(model: &str, options: &str, result: &NormalizedResult) -> String {
    let stats = match result {
        NormalizedResult::Error { error } => return error.clone(),
        NormalizedResult::Fit(stats) => stats,
    };

    let mut lines = vec![
        format!("Fit Function: {}", model),
        format!("Fit Options: {}", options),
        format!("Chi-square: {:.6}", stats.chi2),
        format!("NDF: {}", stats.ndf),
        format!("Reduced Chi-square: {}", reduced_chi2_text(stats, 6)),
        format!("Status: {}", stats.status),
        String::new(),
        "Parameters:".to_owned(),
    ];

    let names = display_names_for(model);
    lines.extend(stats.parameters.iter().enumerate().map(|(i, value)| {
        let name = name_or(&names, i, || format!("p[{}]", i));
        format!("  {} = {:.6} ± {:.6}", name, value, stats.error(i))
    }));

    let annotations = match Annotations::for_model(model, &stats.parameters) {
        Some(Annotations::Gaussian(peak)) => vec![
            format!("  FWHM: {:.3} keV", peak.fwhm_kev),
            format!("  Centroid: {:.3} keV", peak.centroid_kev),
            format!("  Area: {:.1}", peak.area),
        ],
        Some(Annotations::Doublet { peak1, peak2 }) => [(1, peak1), (2, peak2)]
            .into_iter()
            .map(|(n, peak)| {
                format!(
                    "  Peak {}  Centroid: {:.3} keV,  FWHM: {:.3} keV,  Area: {:.1}",
                    n, peak.centroid_kev, peak.fwhm_kev, peak.area
                )
            })
            .collect(),
        Some(Annotations::Landau {
            most_probable_value_kev,
            width_kev,
        }) => vec![
            format!("  Most Probable Value: {:.3} keV", most_probable_value_kev),
            format!("  Width: {:.3} keV", width_kev),
        ],
        None => Vec::new(),
    };
    if !annotations.is_empty() {
        lines.push(String::new());
        lines.push("Peak Annotations:".to_owned());
        lines.extend(annotations);
    }

    lines.join("\n")
}

/// At most five lines, for a plot legend or a status bar.
pub fn format_compact(model: &str, result: &NormalizedResult) -> String {
    let stats = match result {
        NormalizedResult::Error { error } => return error.clone(),
        NormalizedResult::Fit(stats) => stats,
    };

    let mut lines = vec![format!("χ²/ndf = {}", reduced_chi2_text(stats, 3))];

    match (ModelFamily::of(model), Annotations::for_model(model, &stats.parameters)) {
        (ModelFamily::SingleGaussian, Some(Annotations::Gaussian(peak))) => {
            lines.push(format!(
                "Mean  = {:.3} ± {:.3}",
                stats.parameters[1],
                stats.error(1)
            ));
            lines.push(format!(
                "σ    = {:.3} ± {:.3}",
                stats.parameters[2],
                stats.error(2)
            ));
            lines.push(format!("FWHM  = {:.3}", peak.fwhm_kev));
            lines.push(format!("Area  = {:.0}", peak.area));
        }
        (ModelFamily::Doublet, Some(Annotations::Doublet { peak1, peak2 })) => {
            lines.push(format!("P1: {:.3}  FWHM={:.3}", peak1.centroid_kev, peak1.fwhm_kev));
            lines.push(format!("P2: {:.3}  FWHM={:.3}", peak2.centroid_kev, peak2.fwhm_kev));
        }
        _ => {
            let names = display_names_for(model);
            for (i, value) in stats.parameters.iter().take(4).enumerate() {
                let name = name_or(&names, i, || format!("p{}", i));
                lines.push(format!(
                    "{} = {} ± {}",
                    name,
                    format_g(*value, 4),
                    format_g(stats.error(i), 3)
                ));
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_result() -> NormalizedResult {
        NormalizedResult::Fit(FitStats {
            chi2: 12.3,
            ndf: 10,
            status: 0,
            parameters: vec![4000.0, 511.0, 1.2],
            errors: vec![50.0, 0.1, 0.05],
        })
    }

    #[test]
    fn test_format_g_matches_printf() {
        assert_eq!(format_g(0.0, 4), "0");
        assert_eq!(format_g(1234.5678, 4), "1235");
        assert_eq!(format_g(12345.678, 4), "1.235e+04");
        assert_eq!(format_g(0.5, 3), "0.5");
        assert_eq!(format_g(0.000012345, 3), "1.23e-05");
        assert_eq!(format_g(-0.01, 4), "-0.01");
        assert_eq!(format_g(9.9996, 4), "10");
        assert_eq!(format_g(100.0, 3), "100");
    }

    #[test]
    fn test_full_gaussian_report() {
        let text = format_full("gaus", "SQ", &gaussian_result());
        let expected = "Fit Function: gaus\n\
                        Fit Options: SQ\n\
                        Chi-square: 12.300000\n\
                        NDF: 10\n\
                        Reduced Chi-square: 1.230000\n\
                        Status: 0\n\
                        \n\
                        Parameters:\n  \
                        Constant = 4000.000000 ± 50.000000\n  \
                        Mean = 511.000000 ± 0.100000\n  \
                        Sigma = 1.200000 ± 0.050000\n\
                        \n\
                        Peak Annotations:\n  \
                        FWHM: 2.826 keV\n  \
                        Centroid: 511.000 keV\n  \
                        Area: 12031.8";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_zero_ndf_renders_not_available() {
        let result = NormalizedResult::Fit(FitStats {
            chi2: 0.0,
            ndf: 0,
            status: 0,
            parameters: vec![1.0, 2.0, 3.0],
            errors: vec![0.0; 3],
        });
        assert!(format_full("gaus", "SQ", &result).contains("Reduced Chi-square: N/A"));
        assert!(format_compact("gaus", &result).starts_with("χ²/ndf = N/A"));
    }

    #[test]
    fn test_compact_gaussian_summary() {
        let text = format_compact("gaus", &gaussian_result());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "χ²/ndf = 1.230",
                "Mean  = 511.000 ± 0.100",
                "σ    = 1.200 ± 0.050",
                "FWHM  = 2.826",
                "Area  = 12032",
            ]
        );
    }

    #[test]
    fn test_compact_doublet_and_generic() {
        let doublet = NormalizedResult::Fit(FitStats {
            chi2: 20.0,
            ndf: 8,
            status: 0,
            parameters: vec![100.0, 1173.2, 1.0, 80.0, 1178.0, 1.2],
            errors: vec![1.0; 6],
        });
        assert_eq!(
            format_compact("2gaus", &doublet),
            "χ²/ndf = 2.500\nP1: 1173.200  FWHM=2.355\nP2: 1178.000  FWHM=2.826"
        );

        let generic = NormalizedResult::Fit(FitStats {
            chi2: 3.0,
            ndf: 3,
            status: 0,
            parameters: vec![5.0, -0.0123, 7.0, 8.0, 9.0],
            errors: vec![0.5, 0.0004, 0.0, 0.0, 0.0],
        });
        let text = format_compact("expo+pol2", &generic);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "p0 = 5 ± 0.5");
        assert_eq!(lines[2], "p1 = -0.0123 ± 0.0004");
    }

    #[test]
    fn test_errors_render_verbatim() {
        let failed = NormalizedResult::error("Fit failed with status 4.");
        assert_eq!(format_full("gaus", "SQ", &failed), "Fit failed with status 4.");
        assert_eq!(format_compact("gaus", &failed), "Fit failed with status 4.");
    }

    #[test]
    fn test_unlabelled_parameters_fall_back_to_index() {
        let result = NormalizedResult::Fit(FitStats {
            chi2: 1.0,
            ndf: 1,
            status: 0,
            parameters: vec![2.0],
            errors: vec![0.25],
        });
        assert!(format_full("expo", "S", &result).contains("  p[0] = 2.000000 ± 0.250000"));
    }
}
