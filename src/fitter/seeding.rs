//! Initial parameter guesses for the registered curve models.
//!
//! Seeding never fails: a missing histogram, an empty window or an unknown
//! model degrade to a best-effort (or empty) vector.

use super::models::{CurveModel, FWHM_TO_SIGMA};
use crate::histoer::histogram::BinnedHistogram;

const MIN_SIGMA: f64 = 1e-6;

/// The Gaussian core shared by every registered model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSeed {
    pub amplitude: f64,
    pub centroid: f64,
    pub sigma: f64,
}

/// Fit window `(energy - width/2, energy + width/2)`.
pub fn fit_range(energy: Option<f64>, width: Option<f64>) -> Option<(f64, f64)> {
    match (energy, width) {
        (Some(e), Some(w)) if e.is_finite() && w.is_finite() => Some((e - w / 2.0, e + w / 2.0)),
        _ => None,
    }
}

/// A sensible window width for a peak at `energy`: 5 % of the energy, at least 10 keV.
pub fn estimate_peak_width(energy: f64) -> f64 {
    (energy * 0.05).max(10.0)
}

pub fn seed_peak<H: BinnedHistogram + ?Sized>(
    histogram: Option<&H>,
    energy: Option<f64>,
    width: Option<f64>,
    window: (f64, f64),
) -> PeakSeed {
    let (xmin, xmax) = window;

    let mut amplitude = 1.0;
    let mut centroid = energy.unwrap_or((xmin + xmax) / 2.0);

    // Tallest bin in the window seeds the amplitude; the centroid only when no hint.
    if let Some((histogram, bins)) =
        histogram.and_then(|h| h.bins_in_range(xmin, xmax).map(|bins| (h, bins)))
    {
        let mut max_content = f64::NEG_INFINITY;
        let mut max_bin = *bins.start();
        for bin in bins {
            let content = histogram.bin_content(bin);
            if content > max_content {
                max_content = content;
                max_bin = bin;
            }
        }
        amplitude = max_content.max(1.0);
        if energy.is_none() {
            centroid = histogram.bin_center(max_bin);
        }
    }

    let sigma = match width {
        Some(w) if w > 0.0 => w / FWHM_TO_SIGMA,
        _ => {
            let fallback = ((xmax - xmin) / 8.0).max(0.5);
            histogram
                .and_then(|h| half_maximum_width(h, amplitude, centroid, window))
                .map(|fwhm| fwhm / FWHM_TO_SIGMA)
                .unwrap_or(fallback)
        }
    };

    PeakSeed {
        amplitude,
        centroid,
        sigma: sigma.max(MIN_SIGMA),
    }
}

/// Walks outward from the bin holding `centroid` until the content drops to
/// half of `amplitude`. A side without a crossing stops at the window edge.
fn half_maximum_width<H: BinnedHistogram + ?Sized>(
    histogram: &H,
    amplitude: f64,
    centroid: f64,
    window: (f64, f64),
) -> Option<f64> {
    let (xmin, xmax) = window;
    let bins = histogram.bins_in_range(xmin, xmax)?;
    let center = histogram.clamped_bin(centroid)?;
    let half = amplitude / 2.0;

    let left = (*bins.start()..=center)
        .rev()
        .find(|&bin| histogram.bin_content(bin) <= half)
        .map(|bin| histogram.bin_center(bin))
        .unwrap_or(xmin);
    let right = (center..=*bins.end())
        .find(|&bin| histogram.bin_content(bin) <= half)
        .map(|bin| histogram.bin_center(bin))
        .unwrap_or(xmax);

    let fwhm = right - left;
    (fwhm > 0.0).then_some(fwhm)
}

/// Seed vector laid out for `model`, empty for names outside the registry.
pub fn seed_parameters<H: BinnedHistogram + ?Sized>(
    model: &str,
    histogram: Option<&H>,
    energy: Option<f64>,
    width: Option<f64>,
    window: (f64, f64),
) -> Vec<f64> {
    let Some(model) = CurveModel::from_name(model) else {
        return Vec::new();
    };

    let PeakSeed {
        amplitude: a,
        centroid: mu,
        sigma: s,
    } = seed_peak(histogram, energy, width, window);

    match model {
        CurveModel::Gaus => vec![a, mu, s],
        CurveModel::GausPol1 => vec![a, mu, s, 0.0, 0.0],
        CurveModel::GausPol2 => vec![a, mu, s, 0.0, 0.0, 0.0],
        CurveModel::GausErf => vec![a, mu, s, (a * 0.5).max(1.0)],
        CurveModel::DoubleGaus => vec![a, mu, s, a * 0.5, mu + s, s],
        CurveModel::DoubleGausPol1 => vec![a, mu, s, a * 0.5, mu + s, s, 0.0, 0.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histoer::histogram::Histogram;

    // 21 one-keV bins centered on 501.2 ... 521.2 with a line at 511.2
    fn annihilation_peak() -> Histogram {
        let counts = (0..21)
            .map(|i| {
                let x = 501.2 + i as f64;
                10.0 + 4190.0 * (-0.5 * ((x - 511.2) / 1.5f64).powi(2)).exp()
            })
            .collect();
        Histogram::from_counts("na22", counts, (500.7, 521.7))
    }

    #[test]
    fn test_width_hint_sets_sigma() {
        let h = annihilation_peak();
        let seeds = seed_parameters("gaus", Some(&h), Some(511.0), Some(20.0), (501.0, 521.0));
        assert_eq!(seeds.len(), 3);
        assert!((seeds[0] - 4200.0).abs() < 1e-6);
        assert!((seeds[1] - 511.0).abs() < 1e-12);
        assert!((seeds[2] - 8.49).abs() < 0.01);
    }

    #[test]
    fn test_zero_or_negative_width_walks_half_maximum() {
        let h = annihilation_peak();
        for width in [Some(0.0), Some(-3.0), None] {
            let seed = seed_peak(Some(&h), None, width, (501.0, 521.0));
            assert!((seed.centroid - 511.2).abs() < 1e-9);
            // Crossings at 509.2 and 513.2
            assert!((seed.sigma - 4.0 / FWHM_TO_SIGMA).abs() < 1e-9);
            assert!(seed.sigma.is_finite());
        }
    }

    #[test]
    fn test_no_histogram_falls_back_to_window() {
        let seeds = seed_parameters::<Histogram>("gaus", None, None, None, (100.0, 140.0));
        assert_eq!(seeds, vec![1.0, 120.0, 5.0]);

        let narrow = seed_peak::<Histogram>(None, Some(50.0), None, (49.0, 51.0));
        assert!((narrow.sigma - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_window_off_the_axis_is_best_effort() {
        let h = annihilation_peak();
        let seeds = seed_parameters("gaus+pol1", Some(&h), None, None, (900.0, 920.0));
        assert_eq!(seeds, vec![1.0, 910.0, 2.5, 0.0, 0.0]);
    }

    #[test]
    fn test_layouts_per_model() {
        let h = annihilation_peak();
        let window = (501.0, 521.0);
        for model in CurveModel::ALL {
            let seeds = seed_parameters(model.name(), Some(&h), Some(511.0), Some(20.0), window);
            assert_eq!(seeds.len(), model.parameter_count(), "{model}");
        }

        let erf = seed_parameters("gaus+erf", Some(&h), Some(511.0), Some(20.0), window);
        assert!((erf[3] - 2100.0).abs() < 1e-6);

        let doublet = seed_parameters("2gaus", Some(&h), Some(511.0), Some(20.0), window);
        assert!((doublet[3] - 2100.0).abs() < 1e-6);
        assert!((doublet[4] - (511.0 + doublet[2])).abs() < 1e-12);
        assert_eq!(doublet[5], doublet[2]);

        assert!(seed_parameters("landau", Some(&h), None, None, window).is_empty());
    }

    #[test]
    fn test_seeding_is_deterministic() {
        let h = annihilation_peak();
        let a = seed_parameters("2gaus+pol1", Some(&h), None, None, (501.0, 521.0));
        let b = seed_parameters("2gaus+pol1", Some(&h), None, None, (501.0, 521.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_range_and_width_estimate() {
        assert_eq!(fit_range(Some(511.0), Some(20.0)), Some((501.0, 521.0)));
        assert_eq!(fit_range(Some(511.0), None), None);
        assert_eq!(fit_range(None, Some(5.0)), None);
        assert!((estimate_peak_width(100.0) - 10.0).abs() < 1e-12);
        assert!((estimate_peak_width(1332.5) - 66.625).abs() < 1e-9);
    }
}
