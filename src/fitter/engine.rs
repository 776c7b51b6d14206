//! The boundary to an external curve-fitting engine.
//!
//! The crate never minimizes anything itself. An engine receives the formula,
//! its parsed terms, seeds, fixed flags and the option string, fits the
//! histogram over the window and reports back through `EngineOutput`.
//! Engines must keep their own console output to themselves.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::formula::FormulaTerm;
use crate::error::EngineError;
use crate::histoer::histogram::BinnedHistogram;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn reset(&self) {
        self.0.set(false);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Optional bounds on a fit. Both are off by default, so a fit blocks until
/// the engine returns.
#[derive(Debug, Clone, Default)]
pub struct FitControl {
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineCall {
    pub model: String,
    pub formula: String,
    pub terms: Vec<FormulaTerm>,
    pub parameter_count: usize,
    pub window: (f64, f64),
    pub seeds: Vec<f64>,
    /// Parallel to `seeds`.
    pub fixed: Vec<bool>,
    pub options: String,
    /// Engines that can stop early should give up once this passes.
    pub deadline: Option<Instant>,
}

impl EngineCall {
    pub fn has_option(&self, flag: char) -> bool {
        self.options.contains(flag)
    }
}

/// Values read back from the fitted function itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveReadout {
    pub parameters: Vec<f64>,
    pub errors: Vec<f64>,
    pub chi2: f64,
    pub ndf: u32,
}

/// The engine's stored full result (option `S`).
#[derive(Debug, Clone, PartialEq)]
pub struct FullResult {
    pub status: i32,
    pub parameters: Vec<f64>,
    pub errors: Vec<f64>,
    pub chi2: f64,
    pub ndf: u32,
}

/// Either half may be missing; extraction prefers the curve readout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub curve: Option<CurveReadout>,
    pub full_result: Option<FullResult>,
}

pub trait FitEngine {
    fn name(&self) -> &str;

    fn fit(
        &mut self,
        histogram: &dyn BinnedHistogram,
        call: &EngineCall,
    ) -> Result<EngineOutput, EngineError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let control = FitControl::default();
        let remote = control.cancel.clone();
        assert!(!control.cancel.is_cancelled());
        remote.cancel();
        assert!(control.cancel.is_cancelled());
        control.cancel.reset();
        assert!(!remote.is_cancelled());
        assert!(control.timeout.is_none());
    }
}
