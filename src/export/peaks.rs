use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use super::fits::{FIT_SUMMARY_HEADER, FitEntry, fit_entries, fit_summary_row};
use super::{ExportSummary, create_file, exportable_fits, round_to};
use crate::error::{ExportError, LoadError};
use crate::fitter::session::FitRecord;
use crate::histoer::peaks::{Peak, PeakSource};

pub const PEAK_TABLE_HEADER: &str = "Peak_Number,Energy_keV,Counts,Source";

/// Peak table, then (when any fit completed) a blank row, a `Fit Results`
/// row and the fit summary table.
pub fn export_peaks_csv(
    path: &Path,
    peaks: &[Peak],
    records: &[FitRecord],
) -> Result<Option<ExportSummary>, ExportError> {
    if peaks.is_empty() {
        log::warn!("No peaks to export");
        return Ok(None);
    }

    let mut writer = create_file(path)?;
    writeln!(writer, "{}", PEAK_TABLE_HEADER)?;
    for (i, peak) in peaks.iter().enumerate() {
        let counts = peak
            .counts
            .map(|counts| format!("{:.1}", counts))
            .unwrap_or_default();
        writeln!(
            writer,
            "{},{:.2},{},{}",
            i + 1,
            peak.energy,
            counts,
            peak.source.as_str()
        )?;
    }

    let (rows, skipped_errors) = exportable_fits(records);
    if !rows.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Fit Results")?;
        writeln!(writer, "{}", FIT_SUMMARY_HEADER)?;
        for (record, stats) in &rows {
            writeln!(writer, "{}", fit_summary_row(record, stats))?;
        }
    }
    writer.flush()?;

    log::info!(
        "Exported {} peaks and {} fits to {}",
        peaks.len(),
        rows.len(),
        path.display()
    );
    Ok(Some(ExportSummary {
        peaks: peaks.len(),
        fits: rows.len(),
        skipped_errors,
    }))
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PeakEntry {
    pub peak_number: usize,
    #[serde(rename = "energy_keV")]
    pub energy_kev: f64,
    pub counts: Option<f64>,
    pub source: PeakSource,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PeakDocument {
    pub histogram: String,
    pub peaks: Vec<PeakEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fits: Option<Vec<FitEntry>>,
}

impl PeakDocument {
    pub fn new(histogram: &str, peaks: &[Peak], records: &[FitRecord]) -> (Self, usize) {
        let (fits, skipped) = fit_entries(records);
        let document = PeakDocument {
            histogram: histogram.to_owned(),
            peaks: peaks
                .iter()
                .enumerate()
                .map(|(i, peak)| PeakEntry {
                    peak_number: i + 1,
                    energy_kev: round_to(peak.energy, 4),
                    counts: peak.counts.map(|counts| round_to(counts, 2)),
                    source: peak.source,
                })
                .collect(),
            fits: (!fits.is_empty()).then_some(fits),
        };
        (document, skipped)
    }

    pub fn load_json(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

pub fn export_peaks_json(
    path: &Path,
    histogram: &str,
    peaks: &[Peak],
    records: &[FitRecord],
) -> Result<Option<ExportSummary>, ExportError> {
    if peaks.is_empty() {
        log::warn!("No peaks to export");
        return Ok(None);
    }

    let (document, skipped_errors) = PeakDocument::new(histogram, peaks, records);
    let mut writer = create_file(path)?;
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.flush()?;

    let fits = document.fits.as_ref().map_or(0, Vec::len);
    log::info!(
        "Exported {} peaks and {} fits to {}",
        document.peaks.len(),
        fits,
        path.display()
    );
    Ok(Some(ExportSummary {
        peaks: document.peaks.len(),
        fits,
        skipped_errors,
    }))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::super::tests::record;
    use super::*;
    use crate::fitter::result::{FitStats, NormalizedResult};

    fn peaks() -> Vec<Peak> {
        vec![
            Peak {
                energy: 1173.228,
                counts: Some(8012.0),
                source: PeakSource::Automatic,
            },
            Peak {
                energy: 1332.49213,
                counts: None,
                source: PeakSource::Manual,
            },
        ]
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("hpge_fit_{}_{}", std::process::id(), name))
    }

    fn completed() -> NormalizedResult {
        NormalizedResult::Fit(FitStats {
            chi2: 5.0,
            ndf: 5,
            status: 0,
            parameters: vec![100.0, 1173.2, 1.0],
            errors: vec![1.0, 0.01, 0.02],
        })
    }

    #[test]
    fn test_peak_csv_layout() {
        let path = temp_path("peaks.csv");
        let records = vec![
            record(1, Some(completed())),
            record(2, Some(NormalizedResult::error("Fit result is None"))),
        ];
        let summary = export_peaks_csv(&path, &peaks(), &records).unwrap().unwrap();
        assert_eq!(
            summary,
            ExportSummary {
                peaks: 2,
                fits: 1,
                skipped_errors: 1
            }
        );

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], PEAK_TABLE_HEADER);
        assert_eq!(lines[1], "1,1173.23,8012.0,automatic");
        assert_eq!(lines[2], "2,1332.49,,manual");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "Fit Results");
        assert_eq!(lines[5], FIT_SUMMARY_HEADER);
        assert!(lines[6].starts_with("1,gaus,511.000,20.000,5.000000,5,1.000000,0,"));
        assert_eq!(lines.len(), 7);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_peak_csv_without_fits() {
        let path = temp_path("peaks_only.csv");
        export_peaks_csv(&path, &peaks(), &[]).unwrap().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        fs::remove_file(&path).unwrap();

        assert!(export_peaks_csv(&path, &[], &[]).unwrap().is_none());
    }

    #[test]
    fn test_peak_json_document() {
        let path = temp_path("peaks.json");
        export_peaks_json(&path, "co60", &peaks(), &[record(1, Some(completed()))])
            .unwrap()
            .unwrap();

        let document = PeakDocument::load_json(&path).unwrap();
        assert_eq!(document.histogram, "co60");
        assert_eq!(document.peaks[0].peak_number, 1);
        assert_eq!(document.peaks[1].energy_kev, 1332.4921);
        assert_eq!(document.peaks[1].counts, None);
        assert_eq!(document.peaks[1].source, PeakSource::Manual);
        assert_eq!(document.fits.as_ref().map(Vec::len), Some(1));

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"source\": \"manual\""));
        fs::remove_file(&path).unwrap();

        let (without_fits, _) = PeakDocument::new("co60", &peaks(), &[]);
        let json = serde_json::to_string(&without_fits).unwrap();
        assert!(!json.contains("fits"));
    }
}
