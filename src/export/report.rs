//! Page plan of a multi-page fit report.
//!
//! The plan holds everything a renderer needs (titles, text blocks, data and
//! curve points, colors) but draws nothing itself.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local};

use super::create_file;
use crate::error::ExportError;
use crate::fitter::curves::FitTarget;
use crate::fitter::format::format_full;
use crate::fitter::session::FitRecord;
use crate::histoer::histogram::BinnedHistogram;

/// Window width used for a fit page when the fit has no width of its own.
pub const DEFAULT_PAGE_WIDTH: f64 = 20.0;
pub const CURVE_POINTS: usize = 200;

/// Distinct line colors, cycled over the overview curves.
pub const PALETTE: [[u8; 3]; 9] = [
    [255, 0, 0],
    [0, 0, 255],
    [89, 212, 84],
    [255, 0, 255],
    [0, 255, 255],
    [0, 255, 0],
    [89, 84, 217],
    [204, 51, 51],
    [114, 163, 114],
];

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TitlePage {
    pub title: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CurvePlan {
    pub fit_id: u32,
    pub color: [u8; 3],
    pub legend: String,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OverviewPage {
    pub histogram: String,
    pub x_range: (f64, f64),
    pub data: Vec<[f64; 2]>,
    pub curves: Vec<CurvePlan>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FitPage {
    pub fit_id: u32,
    pub title: String,
    pub x_range: (f64, f64),
    pub data: Vec<[f64; 2]>,
    pub curve: Vec<[f64; 2]>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReportPlan {
    pub title: TitlePage,
    pub overview: OverviewPage,
    pub fit_pages: Vec<FitPage>,
}

fn data_points<H: BinnedHistogram>(histogram: &H, range: (f64, f64)) -> Vec<[f64; 2]> {
    let (x, y) = histogram.points_in_range(range.0, range.1);
    x.into_iter().zip(y).map(|(x, y)| [x, y]).collect()
}

fn at_energy(energy: Option<f64>) -> String {
    energy
        .map(|energy| format!(" @ {:.1} keV", energy))
        .unwrap_or_default()
}

fn legend(record: &FitRecord) -> String {
    let reduced = record
        .result
        .as_ref()
        .and_then(|result| result.stats())
        .and_then(|stats| stats.reduced_chi2())
        .map(|reduced| format!("{:.3}", reduced))
        .unwrap_or_else(|| "N/A".to_owned());
    format!(
        "Fit {}: {}{}   χ²/ndf = {}",
        record.id,
        record.model,
        at_energy(record.energy),
        reduced
    )
}

fn page_range<H: BinnedHistogram>(record: &FitRecord, histogram: &H) -> (f64, f64) {
    match record.energy {
        Some(energy) => {
            let width = record.width.unwrap_or(DEFAULT_PAGE_WIDTH);
            (energy - width / 2.0, energy + width / 2.0)
        }
        None => histogram.x_range(),
    }
}

/// `None` when no fit has completed.
pub fn build_report<H: BinnedHistogram>(
    target: &FitTarget<H>,
    records: &[FitRecord],
    generated: DateTime<Local>,
) -> Option<ReportPlan> {
    let mut completed: Vec<&FitRecord> = records.iter().filter(|record| record.has_fit).collect();
    if completed.is_empty() {
        return None;
    }
    completed.sort_by_key(|record| record.id);

    let histogram = target.histogram();

    let mut lines = vec![
        format!("Histogram:  {}", histogram.name()),
        format!("Generated:  {}", generated.format("%Y-%m-%d %H:%M")),
        format!("Completed fits:  {}", completed.len()),
        String::new(),
    ];
    lines.extend(completed.iter().map(|record| {
        format!(
            "  Fit {}:  {}  {}",
            record.id,
            record.model,
            at_energy(record.energy).trim_start()
        )
        .trim_end()
        .to_owned()
    }));

    let curves = completed
        .iter()
        .enumerate()
        .map(|(i, record)| CurvePlan {
            fit_id: record.id,
            color: PALETTE[i % PALETTE.len()],
            legend: legend(record),
            points: record
                .curve
                .and_then(|key| target.curve(key))
                .map(|curve| curve.window_points(CURVE_POINTS))
                .unwrap_or_default(),
        })
        .collect();

    let x_range = histogram.x_range();
    let fit_pages = completed
        .iter()
        .map(|record| {
            let range = page_range(record, histogram);
            let title = match record.energy {
                Some(energy) => format!("Fit {}  [{}]  -  {:.1} keV", record.id, record.model, energy),
                None => format!("Fit {}  [{}]", record.id, record.model),
            };
            FitPage {
                fit_id: record.id,
                title,
                x_range: range,
                data: data_points(histogram, range),
                curve: record
                    .curve
                    .and_then(|key| target.curve(key))
                    .map(|curve| curve.sample_points(range.0, range.1, CURVE_POINTS))
                    .unwrap_or_default(),
                text: record
                    .result
                    .as_ref()
                    .map(|result| format_full(&record.model, &record.options, result))
                    .unwrap_or_default(),
            }
        })
        .collect();

    Some(ReportPlan {
        title: TitlePage {
            title: "Fit Report".to_owned(),
            lines,
        },
        overview: OverviewPage {
            histogram: histogram.name().to_owned(),
            x_range,
            data: data_points(histogram, x_range),
            curves,
        },
        fit_pages,
    })
}

impl ReportPlan {
    pub fn save_json(&self, path: &Path) -> Result<(), ExportError> {
        let mut writer = create_file(path)?;
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
