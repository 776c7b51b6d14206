//! `FitEngine` backed by Python's `lmfit`, through `pyo3`.

use std::time::Instant;

use pyo3::{ffi::c_str, prelude::*, types::PyModule};

use super::engine::{CurveReadout, EngineCall, EngineOutput, FitEngine, FullResult};
use super::formula::FormulaTerm;
use crate::error::EngineError;
use crate::histoer::histogram::BinnedHistogram;

// (kind, a, b, c): offsets into the parameter vector, meaning depends on kind
type TermSpec = (&'static str, usize, usize, usize);

fn term_spec(term: &FormulaTerm) -> TermSpec {
    match *term {
        FormulaTerm::Gaussian { offset } => ("gaus", offset, 0, 0),
        FormulaTerm::Polynomial { degree, offset } => ("pol", degree, offset, 0),
        FormulaTerm::ErfcStep {
            amplitude,
            mean,
            sigma,
        } => ("erfc", amplitude, mean, sigma),
        FormulaTerm::Landau { offset } => ("landau", offset, 0, 0),
        FormulaTerm::Exponential { offset } => ("expo", offset, 0, 0),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LmfitEngine;

impl LmfitEngine {
    pub fn new() -> Self {
        Self
    }

    /// Whether `lmfit` and `numpy` import in the embedded interpreter.
    pub fn is_available() -> bool {
        Python::attach(|py| py.import("lmfit").is_ok() && py.import("numpy").is_ok())
    }

    fn run(
        x_data: Vec<f64>,
        y_data: Vec<f64>,
        call: &EngineCall,
    ) -> Result<(Vec<f64>, Vec<f64>, f64, u32, i32), EngineError> {
        let terms: Vec<TermSpec> = call.terms.iter().map(term_spec).collect();
        let mut seeds = call.seeds.clone();
        seeds.resize(seeds.len().max(call.parameter_count), 0.0);
        let mut fixed = call.fixed.clone();
        fixed.resize(seeds.len(), false);
        let neyman = !call.has_option('W');
        let time_budget = call
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()).as_secs_f64());

        Python::attach(|py| {
            if py.import("lmfit").is_err() {
                return Err(EngineError::Unavailable(
                    "`lmfit` module could not be found. Make sure you are using the correct Python environment with `lmfit` installed.".to_owned(),
                ));
            }
            if py.import("numpy").is_err() {
                return Err(EngineError::Unavailable(
                    "`numpy` module could not be found. Make sure you are using the correct Python environment with `numpy` installed.".to_owned(),
                ));
            }

            let code = c_str!("
import contextlib
import io
import math
import time

import lmfit
import numpy as np

_erfc = np.vectorize(math.erfc)

def evaluate(terms, p, x):
    y = np.zeros_like(x)
    for kind, a, b, c in terms:
        if kind == 'gaus':
            if p[a + 2] != 0:
                y = y + p[a] * np.exp(-0.5 * ((x - p[a + 1]) / p[a + 2]) ** 2)
        elif kind == 'pol':
            for k in range(a + 1):
                y = y + p[b + k] * x ** k
        elif kind == 'erfc':
            if p[c] != 0:
                y = y + p[a] * 0.5 * _erfc((x - p[b]) / (math.sqrt(2) * p[c]))
        elif kind == 'landau':
            if p[a + 2] != 0:
                lam = (x - p[a + 1]) / p[a + 2]
                y = y + p[a] * np.exp(-0.5 * (lam + np.exp(-lam)))
        elif kind == 'expo':
            y = y + np.exp(p[a] + p[a + 1] * x)
    return y

def fit(x_data, y_data, terms, seeds, fixed, neyman, time_budget):
    x = np.asarray(x_data, dtype=float)
    y = np.asarray(y_data, dtype=float)
    sigma = np.sqrt(np.where(y > 0, y, 1.0)) if neyman else np.ones_like(y)

    params = lmfit.Parameters()
    for i, (value, is_fixed) in enumerate(zip(seeds, fixed)):
        params.add(f'p{i}', value=value, vary=not is_fixed)
    names = [f'p{i}' for i in range(len(seeds))]

    def residual(pars):
        p = [pars[name].value for name in names]
        return (y - evaluate(terms, p, x)) / sigma

    started = time.monotonic()
    def past_deadline(*args, **kwargs):
        return time_budget is not None and time.monotonic() - started > time_budget

    with contextlib.redirect_stdout(io.StringIO()), contextlib.redirect_stderr(io.StringIO()):
        result = lmfit.minimize(residual, params, iter_cb=past_deadline)

    values = [float(result.params[name].value) for name in names]
    errors = [float(result.params[name].stderr or 0.0) for name in names]
    status = 0 if result.success and not result.aborted else 4
    return values, errors, float(result.chisqr), int(max(result.nfree, 0)), status
");

            let run = || -> PyResult<(Vec<f64>, Vec<f64>, f64, u32, i32)> {
                let module = PyModule::from_code(py, code, c_str!("hpge_fit.py"), c_str!("hpge_fit"))?;
                let result = module.getattr("fit")?.call1((
                    x_data,
                    y_data,
                    terms,
                    seeds,
                    fixed,
                    neyman,
                    time_budget,
                ))?;

                let values = result.get_item(0)?.extract::<Vec<f64>>()?;
                let errors = result.get_item(1)?.extract::<Vec<f64>>()?;
                let chi2 = result.get_item(2)?.extract::<f64>()?;
                let ndf = result.get_item(3)?.extract::<u32>()?;
                let status = result.get_item(4)?.extract::<i32>()?;
                Ok((values, errors, chi2, ndf, status))
            };

            run().map_err(|err| EngineError::Failed(err.to_string()))
        })
    }
}

impl FitEngine for LmfitEngine {
    fn name(&self) -> &str {
        "lmfit"
    }

    fn fit(
        &mut self,
        histogram: &dyn BinnedHistogram,
        call: &EngineCall,
    ) -> Result<EngineOutput, EngineError> {
        if call.terms.is_empty() {
            return Err(EngineError::UnsupportedFormula(call.formula.clone()));
        }

        let (xmin, xmax) = call.window;
        let (x_data, y_data) = histogram.points_in_range(xmin, xmax);
        if x_data.is_empty() {
            return Err(EngineError::EmptyWindow { xmin, xmax });
        }

        log::debug!(
            "lmfit: {} points, formula '{}', seeds {:?}",
            x_data.len(),
            call.formula,
            call.seeds
        );
        let (parameters, errors, chi2, ndf, status) = Self::run(x_data, y_data, call)?;

        Ok(EngineOutput {
            curve: (status == 0).then(|| CurveReadout {
                parameters: parameters.clone(),
                errors: errors.clone(),
                chi2,
                ndf,
            }),
            full_result: call.has_option('S').then_some(FullResult {
                status,
                parameters,
                errors,
                chi2,
                ndf,
            }),
        })
    }
}
