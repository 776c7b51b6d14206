use super::engine::{CurveReadout, EngineOutput, FullResult};
use super::models::{FWHM_TO_SIGMA, ModelFamily, SQRT_2PI, parameter_count_for};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitStats {
    pub chi2: f64,
    pub ndf: u32,
    pub status: i32,
    pub parameters: Vec<f64>,
    pub errors: Vec<f64>,
}

impl FitStats {
    /// `chi2 / ndf`, `None` when there are no degrees of freedom.
    pub fn reduced_chi2(&self) -> Option<f64> {
        (self.ndf > 0).then(|| self.chi2 / self.ndf as f64)
    }

    pub fn error(&self, index: usize) -> f64 {
        self.errors.get(index).copied().unwrap_or(0.0)
    }
}

/// Outcome of one fit attempt, in a shape that no longer depends on the engine.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum NormalizedResult {
    Fit(FitStats),
    Error { error: String },
}

impl NormalizedResult {
    pub fn error(message: impl Into<String>) -> Self {
        NormalizedResult::Error {
            error: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, NormalizedResult::Fit(_))
    }

    pub fn stats(&self) -> Option<&FitStats> {
        match self {
            NormalizedResult::Fit(stats) => Some(stats),
            NormalizedResult::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            NormalizedResult::Fit(_) => None,
            NormalizedResult::Error { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PeakAnnotation {
    #[serde(rename = "fwhm_keV")]
    pub fwhm_kev: f64,
    #[serde(rename = "centroid_keV")]
    pub centroid_kev: f64,
    pub area: f64,
}

impl PeakAnnotation {
    pub fn from_triple(amplitude: f64, mean: f64, sigma: f64) -> Self {
        PeakAnnotation {
            fwhm_kev: FWHM_TO_SIGMA * sigma,
            centroid_kev: mean,
            area: amplitude * sigma * SQRT_2PI,
        }
    }
}

/// Quantities derived from fitted parameters, never re-fitted.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum Annotations {
    Gaussian(PeakAnnotation),
    Doublet {
        peak1: PeakAnnotation,
        peak2: PeakAnnotation,
    },
    Landau {
        #[serde(rename = "most_probable_value_keV")]
        most_probable_value_kev: f64,
        #[serde(rename = "width_keV")]
        width_kev: f64,
    },
}

impl Annotations {
    pub fn for_model(model: &str, parameters: &[f64]) -> Option<Self> {
        match ModelFamily::of(model) {
            ModelFamily::SingleGaussian => match parameters {
                [a, mu, s, ..] => Some(Annotations::Gaussian(PeakAnnotation::from_triple(
                    *a, *mu, *s,
                ))),
                _ => None,
            },
            ModelFamily::Doublet => match parameters {
                [a1, mu1, s1, a2, mu2, s2, ..] => Some(Annotations::Doublet {
                    peak1: PeakAnnotation::from_triple(*a1, *mu1, *s1),
                    peak2: PeakAnnotation::from_triple(*a2, *mu2, *s2),
                }),
                _ => None,
            },
            ModelFamily::Landau => match parameters {
                [_, mpv, width, ..] => Some(Annotations::Landau {
                    most_probable_value_kev: *mpv,
                    width_kev: *width,
                }),
                _ => None,
            },
            ModelFamily::Generic => None,
        }
    }

    /// The annotation a single-row table can show: the Gaussian of a
    /// single-peak model.
    pub fn single_peak(&self) -> Option<&PeakAnnotation> {
        match self {
            Annotations::Gaussian(peak) => Some(peak),
            Annotations::Doublet { .. } | Annotations::Landau { .. } => None,
        }
    }
}

pub fn failed_status_message(status: i32) -> String {
    format!(
        "Fit failed with status {}. Try adjusting energy range or initial parameters.",
        status
    )
}

/// Turns whatever the engine produced into a `NormalizedResult`.
///
/// A non-zero stored status always wins; otherwise the curve readout is
/// preferred over the stored result.
pub fn extract_result(
    model: &str,
    output: Result<EngineOutput, EngineError>,
) -> NormalizedResult {
    let output = match output {
        Ok(output) => output,
        Err(err) => return NormalizedResult::error(err.to_string()),
    };

    if let Some(full) = &output.full_result {
        if full.status != 0 {
            return NormalizedResult::error(failed_status_message(full.status));
        }
    }

    let stats = match (output.curve, output.full_result) {
        (Some(CurveReadout {
            parameters,
            errors,
            chi2,
            ndf,
        }), _) => FitStats {
            chi2,
            ndf,
            status: 0,
            parameters,
            errors,
        },
        (None, Some(FullResult {
            status,
            parameters,
            errors,
            chi2,
            ndf,
        })) => FitStats {
            chi2,
            ndf,
            status,
            parameters,
            errors,
        },
        (None, None) => return NormalizedResult::error("Fit result is None"),
    };

    normalize(model, stats)
}

/// Makes `errors` parallel to `parameters` and checks the parameter count of
/// registered models.
pub fn normalize(model: &str, mut stats: FitStats) -> NormalizedResult {
    if let Some(expected) = parameter_count_for(model) {
        if stats.parameters.len() != expected {
            return NormalizedResult::error(format!(
                "Fit returned {} parameters, expected {} for model '{}'",
                stats.parameters.len(),
                expected,
                model
            ));
        }
    }

    if !stats.chi2.is_finite() {
        return NormalizedResult::error(format!("Fit returned a non-finite chi-square ({})", stats.chi2));
    }

    stats.errors.resize(stats.parameters.len(), 0.0);
    NormalizedResult::Fit(stats)
}
