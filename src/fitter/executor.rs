use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use super::curves::{CurveKey, FitTarget, FittedCurve, SlotId};
use super::engine::{EngineCall, FitControl, FitEngine};
use super::formula::{self, parse_formula};
use super::models::{formula_for, parameter_count_for};
use super::result::{NormalizedResult, extract_result};
use super::seeding::seed_parameters;
use crate::dispatcher::ErrorDispatcher;
use crate::error::EngineError;
use crate::histoer::histogram::BinnedHistogram;
use crate::scheduler::{Clock, SystemClock};

/// Everything one fit attempt needs besides the target and the engine.
#[derive(Debug, Clone)]
pub struct FitRequest<'a> {
    pub model: &'a str,
    pub slot: SlotId,
    pub epoch: u64,
    pub window: (f64, f64),
    /// Empty means "seed from the histogram".
    pub parameters: Vec<f64>,
    pub fixed: Vec<bool>,
    pub options: &'a str,
    pub previous: Option<CurveKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub result: NormalizedResult,
    /// Key of the curve attached by this attempt, only on success.
    pub curve: Option<CurveKey>,
    /// The option string actually handed to the engine.
    pub options: String,
}

/// Appends the store-full-result flag `S` when missing.
pub fn with_store_option(options: &str) -> String {
    if options.contains('S') {
        options.to_owned()
    } else {
        format!("{options}S")
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Runs single fit attempts. Never fails: every problem ends up in the
/// returned `NormalizedResult`.
pub struct FitExecutor {
    dispatcher: ErrorDispatcher,
    control: FitControl,
    clock: Rc<dyn Clock>,
}

impl std::fmt::Debug for FitExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitExecutor")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl FitExecutor {
    pub fn new(dispatcher: ErrorDispatcher) -> Self {
        FitExecutor {
            dispatcher,
            control: FitControl::default(),
            clock: Rc::new(SystemClock),
        }
    }

    pub fn with_control(mut self, control: FitControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn control(&self) -> &FitControl {
        &self.control
    }

    pub fn run<H, E>(
        &self,
        target: &mut FitTarget<H>,
        engine: &mut E,
        request: FitRequest<'_>,
    ) -> FitOutcome
    where
        H: BinnedHistogram,
        E: FitEngine + ?Sized,
    {
        let options = with_store_option(request.options);
        let failed = |result: NormalizedResult| FitOutcome {
            result,
            curve: None,
            options: options.clone(),
        };

        // The previous curve goes first, whatever happens to this attempt.
        if let Some(previous) = request.previous {
            if target.detach(previous).is_none() {
                self.dispatcher.info(
                    format!(
                        "Curve for fit {} (epoch {}) was already detached",
                        previous.slot, previous.epoch
                    ),
                    "FitExecutor::run",
                );
            }
        }

        let (xmin, xmax) = request.window;
        if !(xmin.is_finite() && xmax.is_finite()) || target.histogram().bin_count_in_range(xmin, xmax) == 0 {
            return failed(NormalizedResult::error(
                EngineError::EmptyWindow { xmin, xmax }.to_string(),
            ));
        }

        let formula_text = formula_for(request.model);
        // Pass-through formulas the parser does not know are still handed to the engine.
        let terms = parse_formula(&formula_text).unwrap_or_default();

        let seeds = if request.parameters.is_empty() {
            seed_parameters(request.model, Some(target.histogram()), None, None, request.window)
        } else {
            request.parameters
        };
        let fixed: Vec<bool> = (0..seeds.len())
            .map(|i| request.fixed.get(i).copied().unwrap_or(false))
            .collect();

        let parameter_count = parameter_count_for(request.model)
            .unwrap_or_else(|| formula::parameter_count(&terms).max(seeds.len()));

        let call = EngineCall {
            model: request.model.to_owned(),
            formula: formula_text,
            terms: terms.clone(),
            parameter_count,
            window: request.window,
            seeds,
            fixed,
            options: options.clone(),
            deadline: self.control.timeout.map(|timeout| self.clock.now() + timeout),
        };

        if self.control.cancel.is_cancelled() {
            return failed(NormalizedResult::error("Fit cancelled before it started"));
        }

        log::info!(
            "Fitting '{}' for fit {} (epoch {}) over [{:.3}, {:.3}] with {} on {}",
            request.model,
            request.slot,
            request.epoch,
            xmin,
            xmax,
            options,
            engine.name()
        );

        let started = self.clock.now();
        let histogram: &dyn BinnedHistogram = target.histogram();
        let output = panic::catch_unwind(AssertUnwindSafe(|| engine.fit(histogram, &call)))
            .unwrap_or_else(|payload| {
                Err(EngineError::Failed(format!(
                    "engine panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        let elapsed = self.clock.now().saturating_duration_since(started);

        if let Some(timeout) = self.control.timeout {
            if elapsed > timeout {
                self.dispatcher.warning(
                    format!(
                        "Fit {} took {:?}, longer than its {:?} timeout",
                        request.slot, elapsed, timeout
                    ),
                    "FitExecutor::run",
                );
            }
        }

        if self.control.cancel.is_cancelled() {
            return failed(NormalizedResult::error("Fit cancelled"));
        }

        let result = extract_result(request.model, output);
        match &result {
            NormalizedResult::Fit(stats) => {
                let key = CurveKey {
                    slot: request.slot,
                    epoch: request.epoch,
                };
                target.attach(FittedCurve::new(
                    key,
                    request.model,
                    terms,
                    stats.parameters.clone(),
                    request.window,
                ));
                log::info!(
                    "Fit {} finished: chi2 = {:.3}, ndf = {}",
                    request.slot,
                    stats.chi2,
                    stats.ndf
                );
                FitOutcome {
                    result,
                    curve: Some(key),
                    options,
                }
            }
            NormalizedResult::Error { error } => {
                log::warn!("Fit {} failed: {}", request.slot, error);
                failed(result)
            }
        }
    }
}
