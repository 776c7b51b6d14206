use std::collections::BTreeMap;

use super::formula::{self, FormulaTerm};
use crate::histoer::histogram::BinnedHistogram;

pub type SlotId = u32;

/// Arena key of a fitted curve. A slot's epoch grows with every fit attempt,
/// so repeated fits of one slot never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct CurveKey {
    pub slot: SlotId,
    pub epoch: u64,
}

/// A fitted function attached to a histogram clone.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FittedCurve {
    pub key: CurveKey,
    pub name: String,
    pub model: String,
    pub terms: Vec<FormulaTerm>,
    pub parameters: Vec<f64>,
    pub window: (f64, f64),
}

impl FittedCurve {
    pub fn new(
        key: CurveKey,
        model: &str,
        terms: Vec<FormulaTerm>,
        parameters: Vec<f64>,
        window: (f64, f64),
    ) -> Self {
        FittedCurve {
            key,
            name: curve_name(model, key),
            model: model.to_owned(),
            terms,
            parameters,
            window,
        }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        formula::evaluate(&self.terms, &self.parameters, x)
    }

    /// `num_points` evenly spaced samples over `[xmin, xmax]`, for overlays.
    pub fn sample_points(&self, xmin: f64, xmax: f64, num_points: usize) -> Vec<[f64; 2]> {
        if num_points < 2 || xmax <= xmin {
            return Vec::new();
        }
        let step = (xmax - xmin) / (num_points - 1) as f64;
        (0..num_points)
            .map(|i| {
                let x = xmin + step * i as f64;
                [x, self.evaluate(x)]
            })
            .collect()
    }

    pub fn window_points(&self, num_points: usize) -> Vec<[f64; 2]> {
        self.sample_points(self.window.0, self.window.1, num_points)
    }
}

pub fn curve_name(model: &str, key: CurveKey) -> String {
    format!("fit_{}_{}_{}", model, key.slot, key.epoch)
}

/// A histogram clone plus the curves currently attached to it.
///
/// Every slot of a session fits against the same target; each slot only ever
/// touches the curve under its own key.
#[derive(Debug, Clone)]
pub struct FitTarget<H> {
    histogram: H,
    curves: BTreeMap<CurveKey, FittedCurve>,
}

impl<H: BinnedHistogram> FitTarget<H> {
    pub fn new(histogram: H) -> Self {
        FitTarget {
            histogram,
            curves: BTreeMap::new(),
        }
    }

    pub fn histogram(&self) -> &H {
        &self.histogram
    }

    pub fn attach(&mut self, curve: FittedCurve) {
        log::debug!("Attaching curve '{}'", curve.name);
        if let Some(old) = self.curves.insert(curve.key, curve) {
            log::warn!("Curve '{}' replaced an attached curve with the same key", old.name);
        }
    }

    pub fn detach(&mut self, key: CurveKey) -> Option<FittedCurve> {
        let removed = self.curves.remove(&key);
        match &removed {
            Some(curve) => log::debug!("Detached curve '{}'", curve.name),
            None => log::debug!(
                "No curve attached for slot {} epoch {}",
                key.slot,
                key.epoch
            ),
        }
        removed
    }

    /// Drops every curve of `slot`, whatever its epoch.
    pub fn detach_slot(&mut self, slot: SlotId) -> usize {
        let before = self.curves.len();
        self.curves.retain(|key, _| key.slot != slot);
        before - self.curves.len()
    }

    pub fn curve(&self, key: CurveKey) -> Option<&FittedCurve> {
        self.curves.get(&key)
    }

    pub fn curves(&self) -> impl Iterator<Item = &FittedCurve> {
        self.curves.values()
    }

    pub fn curves_for_slot(&self, slot: SlotId) -> Vec<&FittedCurve> {
        self.curves
            .values()
            .filter(|curve| curve.key.slot == slot)
            .collect()
    }

    pub fn clear_curves(&mut self) {
        self.curves.clear();
    }
}
