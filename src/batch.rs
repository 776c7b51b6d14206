//! Unattended processing of many histograms: peak search, one fit per peak,
//! and a summary report on disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{BatchConfig, SessionSettings};
use crate::dispatcher::ErrorDispatcher;
use crate::error::ExportError;
use crate::export::fits::{export_fits_csv, export_fits_json};
use crate::export::peaks::export_peaks_csv;
use crate::export::{create_file, csv_field};
use crate::fitter::engine::FitEngine;
use crate::fitter::session::{FitRecord, FitSession};
use crate::histoer::histogram::{BinnedHistogram, Histogram};
use crate::histoer::peaks::Peak;

pub const SUMMARY_FILE: &str = "batch_summary.csv";
pub const SUMMARY_HEADER: &str = "Histogram,Peaks_Found,Fits_Completed,Fits_Failed,Processing_Status";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    Failed(String),
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub histogram: String,
    pub peaks: Vec<Peak>,
    pub records: Vec<FitRecord>,
    pub fits_completed: usize,
    pub fits_failed: usize,
    pub status: BatchStatus,
}

impl BatchResult {
    fn failed(histogram: String, reason: String) -> Self {
        BatchResult {
            histogram,
            peaks: Vec::new(),
            records: Vec::new(),
            fits_completed: 0,
            fits_failed: 0,
            status: BatchStatus::Failed(reason),
        }
    }
}

/// Searches `histogram` for peaks and fits each with the configured model
/// over a `fit_width` window.
pub fn process_histogram<H, E>(
    histogram: &H,
    config: &BatchConfig,
    engine: &mut E,
    dispatcher: &ErrorDispatcher,
) -> BatchResult
where
    H: BinnedHistogram + Clone,
    E: FitEngine + ?Sized,
{
    let peaks = config.peak_finding.find_peaks(histogram);
    log::info!("{}: found {} peaks", histogram.name(), peaks.len());

    let settings = SessionSettings {
        default_model: config.model.clone(),
        default_options: config.options.clone(),
        ..Default::default()
    };
    let mut session = FitSession::new(settings, dispatcher.clone());
    session.select_histogram(histogram);
    session.add_fits_for_peaks(&peaks, config.fit_width);

    let results = session.perform_all(engine);
    let fits_completed = results.iter().filter(|(_, result)| result.is_ok()).count();

    BatchResult {
        histogram: histogram.name().to_owned(),
        peaks,
        records: session.fit_records(),
        fits_completed,
        fits_failed: results.len() - fits_completed,
        status: BatchStatus::Completed,
    }
}

fn histogram_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Loads and processes every histogram listed in `config`. A file that
/// cannot be loaded yields a failed entry; the batch carries on.
pub fn run_batch<E: FitEngine + ?Sized>(
    config: &BatchConfig,
    engine: &mut E,
    dispatcher: &ErrorDispatcher,
) -> Vec<BatchResult> {
    let total = config.histograms.len();
    log::info!("Starting batch processing of {} histogram(s)", total);

    let results: Vec<BatchResult> = config
        .histograms
        .iter()
        .enumerate()
        .map(|(i, path)| {
            log::info!("[{}/{}] Processing {}", i + 1, total, path.display());
            match Histogram::load_json(path) {
                Ok(histogram) => {
                    let result = process_histogram(&histogram, config, engine, dispatcher);
                    log::info!(
                        "  Peaks: {}, Fits: {}",
                        result.peaks.len(),
                        result.fits_completed
                    );
                    result
                }
                Err(err) => {
                    dispatcher.error(
                        format!("Could not load {}: {}", path.display(), err),
                        "batch",
                    );
                    BatchResult::failed(histogram_label(path), err.to_string())
                }
            }
        })
        .collect();

    log::info!("Batch processing complete");
    results
}

fn file_stem_for(histogram: &str) -> String {
    histogram
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

/// Writes `batch_summary.csv` plus per-histogram fit CSV/JSON and peak CSV
/// into `output_dir`. Returns the summary path, `None` for an empty batch.
pub fn write_batch_report(
    results: &[BatchResult],
    output_dir: &Path,
) -> Result<Option<PathBuf>, ExportError> {
    if results.is_empty() {
        log::warn!("No batch results to report");
        return Ok(None);
    }
    fs::create_dir_all(output_dir)?;

    let summary_path = output_dir.join(SUMMARY_FILE);
    let mut writer = create_file(&summary_path)?;
    writeln!(writer, "{}", SUMMARY_HEADER)?;
    for result in results {
        writeln!(
            writer,
            "{},{},{},{},{}",
            csv_field(&result.histogram),
            result.peaks.len(),
            result.fits_completed,
            result.fits_failed,
            csv_field(&result.status.to_string())
        )?;
    }
    writer.flush()?;

    for result in results {
        let stem = file_stem_for(&result.histogram);
        if !result.records.is_empty() {
            export_fits_csv(&output_dir.join(format!("{}_fits.csv", stem)), &result.records)?;
            export_fits_json(
                &output_dir.join(format!("{}_fits.json", stem)),
                &result.histogram,
                &result.records,
            )?;
        }
        if !result.peaks.is_empty() {
            export_peaks_csv(&output_dir.join(format!("{}_peaks.csv", stem)), &result.peaks, &[])?;
        }
    }

    log::info!("Batch report written to {}", output_dir.display());
    Ok(Some(summary_path))
}
