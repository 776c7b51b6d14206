//! Tabular (CSV) and structured (JSON) exports of fit and peak results, plus
//! the page plan of a multi-page fit report.
//!
//! Error results are never written; they are counted in [`ExportSummary`].
//! An export with nothing to write returns `Ok(None)`.

pub mod fits;
pub mod peaks;
pub mod report;

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::error::ExportError;
use crate::fitter::result::FitStats;
use crate::fitter::session::FitRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub peaks: usize,
    pub fits: usize,
    pub skipped_errors: usize,
}

/// Completed fits in id order, and how many error results were left out.
/// Slots that were never fitted are neither exported nor counted.
pub fn exportable_fits(records: &[FitRecord]) -> (Vec<(&FitRecord, &FitStats)>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0;
    for record in records {
        match record.result.as_ref() {
            Some(result) => match result.stats() {
                Some(stats) => rows.push((record, stats)),
                None => skipped += 1,
            },
            None => {}
        }
    }
    rows.sort_by_key(|(record, _)| record.id);
    (rows, skipped)
}

pub(crate) fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}

pub(crate) fn create_file(path: &Path) -> Result<BufWriter<File>, ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
