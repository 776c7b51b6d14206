use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use super::{ExportSummary, create_file, csv_field, exportable_fits};
use crate::error::{ExportError, LoadError};
use crate::fitter::result::{Annotations, FitStats};
use crate::fitter::session::FitRecord;

pub const FIT_TABLE_HEADER: &str = "Fit_ID,Fit_Function,Energy_keV,Width_keV,Chi2,NDF,Reduced_Chi2,Status,Parameters,Errors,FWHM_keV,Centroid_keV,Area";
pub const FIT_SUMMARY_HEADER: &str = "Fit_ID,Fit_Function,Energy_keV,Width_keV,Chi2,NDF,Reduced_Chi2,Status,FWHM_keV,Centroid_keV,Area";

fn joined(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| format!("{:.6}", value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn optional(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|value| format!("{:.*}", decimals, value))
        .unwrap_or_default()
}

// Columns of FIT_TABLE_HEADER, in order
fn fit_fields(record: &FitRecord, stats: &FitStats) -> [String; 13] {
    let peak = Annotations::for_model(&record.model, &stats.parameters);
    let peak = peak.as_ref().and_then(Annotations::single_peak);

    [
        record.id.to_string(),
        csv_field(&record.model).into_owned(),
        optional(record.energy, 3),
        optional(record.width, 3),
        format!("{:.6}", stats.chi2),
        stats.ndf.to_string(),
        optional(stats.reduced_chi2(), 6),
        stats.status.to_string(),
        joined(&stats.parameters),
        joined(&stats.errors),
        optional(peak.map(|p| p.fwhm_kev), 3),
        optional(peak.map(|p| p.centroid_kev), 3),
        optional(peak.map(|p| p.area), 1),
    ]
}

/// One CSV line of the fit table, without the trailing newline.
pub fn fit_row(record: &FitRecord, stats: &FitStats) -> String {
    fit_fields(record, stats).join(",")
}

/// The fit table row without the parameter and error lists.
pub fn fit_summary_row(record: &FitRecord, stats: &FitStats) -> String {
    let fields = fit_fields(record, stats);
    [&fields[..8], &fields[10..]].concat().join(",")
}

/// Header plus one row per completed fit. Returns (written, skipped errors).
pub fn write_fit_table<W: Write>(
    writer: &mut W,
    records: &[FitRecord],
) -> Result<(usize, usize), ExportError> {
    let (rows, skipped) = exportable_fits(records);
    writeln!(writer, "{}", FIT_TABLE_HEADER)?;
    for (record, stats) in &rows {
        writeln!(writer, "{}", fit_row(record, stats))?;
    }
    Ok((rows.len(), skipped))
}

pub fn export_fits_csv(
    path: &Path,
    records: &[FitRecord],
) -> Result<Option<ExportSummary>, ExportError> {
    let (rows, skipped) = exportable_fits(records);
    if rows.is_empty() {
        log::warn!("No completed fits to export ({} failed)", skipped);
        return Ok(None);
    }

    let mut writer = create_file(path)?;
    let (fits, skipped_errors) = write_fit_table(&mut writer, records)?;
    writer.flush()?;

    log::info!("Exported {} fits to {}", fits, path.display());
    Ok(Some(ExportSummary {
        peaks: 0,
        fits,
        skipped_errors,
    }))
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ParameterValue {
    pub index: usize,
    pub value: f64,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitEntry {
    pub fit_id: u32,
    pub fit_function: String,
    #[serde(rename = "energy_keV")]
    pub energy_kev: Option<f64>,
    #[serde(rename = "width_keV")]
    pub width_kev: Option<f64>,
    pub chi2: f64,
    pub ndf: u32,
    pub reduced_chi2: Option<f64>,
    pub status: i32,
    pub parameters: Vec<ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl FitEntry {
    pub fn new(record: &FitRecord, stats: &FitStats) -> Self {
        FitEntry {
            fit_id: record.id,
            fit_function: record.model.clone(),
            energy_kev: record.energy,
            width_kev: record.width,
            chi2: stats.chi2,
            ndf: stats.ndf,
            reduced_chi2: stats.reduced_chi2(),
            status: stats.status,
            parameters: stats
                .parameters
                .iter()
                .enumerate()
                .map(|(index, &value)| ParameterValue {
                    index,
                    value,
                    error: stats.error(index),
                })
                .collect(),
            annotations: Annotations::for_model(&record.model, &stats.parameters),
        }
    }
}

/// Completed fits as `FitEntry`s, plus the skipped error count.
pub fn fit_entries(records: &[FitRecord]) -> (Vec<FitEntry>, usize) {
    let (rows, skipped) = exportable_fits(records);
    let entries = rows
        .into_iter()
        .map(|(record, stats)| FitEntry::new(record, stats))
        .collect();
    (entries, skipped)
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitDocument {
    pub histogram: String,
    pub export_timestamp: String,
    pub fits: Vec<FitEntry>,
}

impl FitDocument {
    pub fn load_json(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

pub fn export_fits_json(
    path: &Path,
    histogram: &str,
    records: &[FitRecord],
) -> Result<Option<ExportSummary>, ExportError> {
    let (fits, skipped_errors) = fit_entries(records);
    if fits.is_empty() {
        log::warn!("No completed fits to export ({} failed)", skipped_errors);
        return Ok(None);
    }

    let document = FitDocument {
        histogram: histogram.to_owned(),
        export_timestamp: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        fits,
    };

    let mut writer = create_file(path)?;
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.flush()?;

    log::info!("Exported {} fits to {}", document.fits.len(), path.display());
    Ok(Some(ExportSummary {
        peaks: 0,
        fits: document.fits.len(),
        skipped_errors,
    }))
}
