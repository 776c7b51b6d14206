//! Fit slots of one histogram selection and their refit lifecycle.
//!
//! ```text
//! Created -> Dirty -> Fitting -> Complete | Failed
//!              ^                     |
//!              +------- edit --------+
//! ```
//!
//! Every edit marks the slot dirty and (re)schedules a debounced refit; the
//! owner drives refits by calling [`FitSession::poll`] from its event loop.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use super::curves::{CurveKey, FitTarget, SlotId};
use super::engine::{FitControl, FitEngine};
use super::executor::{FitExecutor, FitRequest};
use super::models::labels_for;
use super::result::NormalizedResult;
use super::seeding::{estimate_peak_width, fit_range, seed_parameters};
use crate::config::SessionSettings;
use crate::dispatcher::ErrorDispatcher;
use crate::histoer::histogram::BinnedHistogram;
use crate::histoer::peaks::Peak;
use crate::scheduler::{Clock, Scheduler, SystemClock, TaskHandle};

/// Default window width for fits created from a peak list.
pub const AUTO_FIT_WIDTH: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum SlotState {
    Created,
    Dirty,
    Fitting,
    Complete,
    Failed,
}

/// One initial parameter. `None` means "seed it from the histogram".
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ParameterEntry {
    pub label: String,
    pub value: Option<f64>,
    pub fixed: bool,
}

#[derive(Debug, Clone)]
pub struct FitSlot {
    pub id: SlotId,
    pub model: String,
    /// Explicit window; overrides the one derived from energy and width.
    pub window: Option<(f64, f64)>,
    pub energy: Option<f64>,
    pub width: Option<f64>,
    pub parameters: Vec<ParameterEntry>,
    pub options: String,
    pub epoch: u64,
    pub curve: Option<CurveKey>,
    pub result: Option<NormalizedResult>,
    pub state: SlotState,
    pub peak_index: Option<usize>,
    pending: Option<TaskHandle>,
}

fn entries_for(model: &str) -> Vec<ParameterEntry> {
    labels_for(model)
        .into_iter()
        .map(|label| ParameterEntry {
            label,
            value: None,
            fixed: false,
        })
        .collect()
}

impl FitSlot {
    fn new(
        id: SlotId,
        settings: &SessionSettings,
        energy: Option<f64>,
        width: Option<f64>,
        peak_index: Option<usize>,
    ) -> Self {
        FitSlot {
            id,
            model: settings.default_model.clone(),
            window: None,
            energy,
            width,
            parameters: entries_for(&settings.default_model),
            options: settings.default_options.clone(),
            epoch: 0,
            curve: None,
            result: None,
            state: SlotState::Created,
            peak_index,
            pending: None,
        }
    }

    pub fn has_fit(&self) -> bool {
        matches!(self.result, Some(NormalizedResult::Fit(_)))
    }

    pub fn display_name(&self) -> String {
        match self.energy {
            Some(energy) => format!("Fit {} ({:.0} keV)", self.id, energy),
            None => format!("Fit {}", self.id),
        }
    }

    /// Explicit window, else the energy/width window, else the whole axis.
    /// A missing or non-positive width falls back to `estimate_peak_width`.
    pub fn fit_window<H: BinnedHistogram + ?Sized>(&self, histogram: Option<&H>) -> Option<(f64, f64)> {
        let width = match (self.energy, self.width) {
            (_, Some(width)) if width > 0.0 => Some(width),
            (Some(energy), _) => Some(estimate_peak_width(energy)),
            (None, _) => None,
        };
        self.window
            .or_else(|| fit_range(self.energy, width))
            .or_else(|| histogram.map(|h| h.x_range()))
    }

    pub fn fixed_flags(&self) -> Vec<bool> {
        self.parameters.iter().map(|entry| entry.fixed).collect()
    }

    /// Explicit values where set, `seeds` elsewhere.
    pub fn initial_parameters(&self, seeds: &[f64]) -> Vec<f64> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                entry
                    .value
                    .unwrap_or_else(|| seeds.get(i).copied().unwrap_or(0.0))
            })
            .collect()
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.cancel();
        }
    }
}

/// What exporters and reports need from a slot.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FitRecord {
    pub id: SlotId,
    pub model: String,
    pub energy: Option<f64>,
    pub width: Option<f64>,
    pub options: String,
    pub result: Option<NormalizedResult>,
    pub has_fit: bool,
    pub curve: Option<CurveKey>,
}

impl From<&FitSlot> for FitRecord {
    fn from(slot: &FitSlot) -> Self {
        FitRecord {
            id: slot.id,
            model: slot.model.clone(),
            energy: slot.energy,
            width: slot.width,
            options: slot.options.clone(),
            result: slot.result.clone(),
            has_fit: slot.has_fit(),
            curve: slot.curve,
        }
    }
}

type FitCompleted = Box<dyn FnMut(SlotId, &NormalizedResult)>;

pub struct FitSession<H> {
    target: Option<FitTarget<H>>,
    slots: BTreeMap<SlotId, FitSlot>,
    next_id: SlotId,
    current: Option<SlotId>,
    scheduler: Scheduler<SlotId>,
    settings: SessionSettings,
    dispatcher: ErrorDispatcher,
    executor: FitExecutor,
    clock: Rc<dyn Clock>,
    on_fit_completed: Option<FitCompleted>,
}

impl<H> std::fmt::Debug for FitSession<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitSession")
            .field("slots", &self.slots)
            .field("current", &self.current)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<H: BinnedHistogram + Clone> FitSession<H> {
    pub fn new(settings: SessionSettings, dispatcher: ErrorDispatcher) -> Self {
        Self::with_clock(settings, dispatcher, Rc::new(SystemClock))
    }

    pub fn with_clock(
        settings: SessionSettings,
        dispatcher: ErrorDispatcher,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let executor = FitExecutor::new(dispatcher.clone())
            .with_clock(Rc::clone(&clock))
            .with_control(FitControl {
                timeout: settings.timeout(),
                ..Default::default()
            });
        FitSession {
            target: None,
            slots: BTreeMap::new(),
            next_id: 1,
            current: None,
            scheduler: Scheduler::new(),
            settings,
            dispatcher,
            executor,
            clock,
            on_fit_completed: None,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &ErrorDispatcher {
        &self.dispatcher
    }

    /// Shared with the executor: cancelling here aborts the fit in progress.
    pub fn fit_control(&self) -> &FitControl {
        self.executor.control()
    }

    pub fn set_on_fit_completed(&mut self, callback: impl FnMut(SlotId, &NormalizedResult) + 'static) {
        self.on_fit_completed = Some(Box::new(callback));
    }

    /// Clones `histogram` as the new fit target. Slots and curves of the
    /// previous selection are dropped.
    pub fn select_histogram(&mut self, histogram: &H) {
        log::info!("Selected histogram '{}' for fitting", histogram.name());
        self.clear_fits();
        self.target = Some(FitTarget::new(histogram.clone()));
    }

    pub fn histogram(&self) -> Option<&H> {
        self.target.as_ref().map(|target| target.histogram())
    }

    pub fn target(&self) -> Option<&FitTarget<H>> {
        self.target.as_ref()
    }

    pub fn add_fit(
        &mut self,
        energy: Option<f64>,
        width: Option<f64>,
        peak_index: Option<usize>,
    ) -> SlotId {
        let id = self.next_id;
        self.next_id += 1;
        self.slots
            .insert(id, FitSlot::new(id, &self.settings, energy, width, peak_index));
        self.current = Some(id);
        log::debug!("Added fit {}", id);
        id
    }

    pub fn remove_fit(&mut self, id: SlotId) -> bool {
        let Some(mut slot) = self.slots.remove(&id) else {
            return false;
        };
        slot.cancel_pending();
        if let Some(target) = self.target.as_mut() {
            target.detach_slot(id);
        }
        if self.current == Some(id) {
            self.current = self.slots.keys().next_back().copied();
        }
        log::debug!("Removed fit {}", id);
        true
    }

    pub fn clear_fits(&mut self) {
        self.scheduler.clear();
        self.slots.clear();
        self.current = None;
        if let Some(target) = self.target.as_mut() {
            target.clear_curves();
        }
    }

    /// Replaces every slot with one fit per peak, `width` wide.
    pub fn add_fits_for_peaks(&mut self, peaks: &[Peak], width: f64) -> Vec<SlotId> {
        self.clear_fits();
        peaks
            .iter()
            .enumerate()
            .map(|(index, peak)| self.add_fit(Some(peak.energy), Some(width), Some(index)))
            .collect()
    }

    pub fn slot(&self, id: SlotId) -> Option<&FitSlot> {
        self.slots.get(&id)
    }

    pub fn slots(&self) -> impl Iterator<Item = &FitSlot> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn current(&self) -> Option<SlotId> {
        self.current
    }

    pub fn select(&mut self, id: SlotId) -> bool {
        let exists = self.slots.contains_key(&id);
        if exists {
            self.current = Some(id);
        }
        exists
    }

    pub fn display_name(&self, id: SlotId) -> Option<String> {
        self.slots.get(&id).map(FitSlot::display_name)
    }

    pub fn list_fits(&self) -> Vec<(SlotId, String)> {
        self.slots
            .values()
            .map(|slot| (slot.id, slot.display_name()))
            .collect()
    }

    pub fn fit_records(&self) -> Vec<FitRecord> {
        self.slots.values().map(FitRecord::from).collect()
    }

    fn mark_dirty(&mut self, id: SlotId) {
        let due = self.clock.now() + self.settings.debounce();
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.cancel_pending();
            slot.state = SlotState::Dirty;
            slot.pending = Some(self.scheduler.schedule(due, id));
        }
    }

    fn edit(&mut self, id: SlotId, apply: impl FnOnce(&mut FitSlot) -> bool) -> bool {
        let changed = self.slots.get_mut(&id).is_some_and(apply);
        if changed {
            self.mark_dirty(id);
        }
        changed
    }

    fn parse_number(&self, id: SlotId, field: &str, text: &str) -> Result<Option<f64>, ()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => {
                log::warn!("Dropping non-numeric {} '{}' for fit {}", field, text, id);
                self.dispatcher.warning(
                    format!("Invalid {} '{}' for fit {}: not a number", field, text, id),
                    "FitSession",
                );
                Err(())
            }
        }
    }

    /// Switching models resets the parameter entries to the new layout.
    pub fn set_model(&mut self, id: SlotId, model: &str) -> bool {
        self.edit(id, |slot| {
            if slot.model != model {
                slot.model = model.to_owned();
                slot.parameters = entries_for(model);
            }
            true
        })
    }

    pub fn set_energy(&mut self, id: SlotId, energy: Option<f64>) -> bool {
        self.edit(id, |slot| {
            slot.energy = energy;
            true
        })
    }

    pub fn set_energy_text(&mut self, id: SlotId, text: &str) -> bool {
        match self.parse_number(id, "energy", text) {
            Ok(energy) => self.set_energy(id, energy),
            Err(()) => false,
        }
    }

    pub fn set_width(&mut self, id: SlotId, width: Option<f64>) -> bool {
        self.edit(id, |slot| {
            slot.width = width;
            true
        })
    }

    pub fn set_width_text(&mut self, id: SlotId, text: &str) -> bool {
        match self.parse_number(id, "width", text) {
            Ok(width) => self.set_width(id, width),
            Err(()) => false,
        }
    }

    pub fn set_window(&mut self, id: SlotId, window: Option<(f64, f64)>) -> bool {
        self.edit(id, |slot| {
            slot.window = window;
            true
        })
    }

    pub fn set_options(&mut self, id: SlotId, options: &str) -> bool {
        self.edit(id, |slot| {
            slot.options = options.to_owned();
            true
        })
    }

    /// `None` hands the parameter back to the seeder.
    pub fn set_parameter(&mut self, id: SlotId, index: usize, value: Option<f64>) -> bool {
        self.edit(id, |slot| match slot.parameters.get_mut(index) {
            Some(entry) => {
                entry.value = value;
                true
            }
            None => false,
        })
    }

    pub fn set_parameter_text(&mut self, id: SlotId, index: usize, text: &str) -> bool {
        match self.parse_number(id, "parameter", text) {
            Ok(value) => self.set_parameter(id, index, value),
            Err(()) => false,
        }
    }

    pub fn set_fixed(&mut self, id: SlotId, index: usize, fixed: bool) -> bool {
        self.edit(id, |slot| match slot.parameters.get_mut(index) {
            Some(entry) => {
                entry.fixed = fixed;
                true
            }
            None => false,
        })
    }

    /// Fits slot `id` now, cancelling any pending refit.
    pub fn perform_fit<E: FitEngine + ?Sized>(&mut self, id: SlotId, engine: &mut E) -> NormalizedResult {
        let Some(slot) = self.slots.get_mut(&id) else {
            let message = format!("Unknown fit ID: {}", id);
            self.dispatcher.error(message.clone(), "FitSession::perform_fit");
            return NormalizedResult::error(message);
        };
        let Some(target) = self.target.as_mut() else {
            let message = "No histogram selected for fitting".to_owned();
            self.dispatcher.error(message.clone(), "FitSession::perform_fit");
            return NormalizedResult::error(message);
        };

        slot.cancel_pending();
        slot.state = SlotState::Fitting;
        slot.epoch += 1;

        let histogram = target.histogram();
        let window = slot
            .fit_window(Some(histogram))
            .unwrap_or_else(|| histogram.x_range());
        let parameters = if slot.parameters.is_empty() {
            Vec::new()
        } else {
            let seeds = seed_parameters(&slot.model, Some(histogram), slot.energy, slot.width, window);
            slot.initial_parameters(&seeds)
        };

        let outcome = self.executor.run(
            target,
            engine,
            FitRequest {
                model: &slot.model,
                slot: id,
                epoch: slot.epoch,
                window,
                parameters,
                fixed: slot.fixed_flags(),
                options: &slot.options,
                previous: slot.curve,
            },
        );

        slot.curve = outcome.curve;
        slot.state = if outcome.result.is_ok() {
            SlotState::Complete
        } else {
            SlotState::Failed
        };
        if let Some(message) = outcome.result.error_message() {
            self.dispatcher
                .error(format!("Fit {} failed: {}", id, message), "FitSession::perform_fit");
        }
        slot.result = Some(outcome.result.clone());

        if let Some(callback) = self.on_fit_completed.as_mut() {
            callback(id, &outcome.result);
        }
        outcome.result
    }

    /// Fits every slot in id order.
    pub fn perform_all<E: FitEngine + ?Sized>(&mut self, engine: &mut E) -> Vec<(SlotId, NormalizedResult)> {
        let ids: Vec<SlotId> = self.slots.keys().copied().collect();
        ids.into_iter()
            .map(|id| (id, self.perform_fit(id, engine)))
            .collect()
    }

    /// Runs the refits whose debounce has elapsed. Returns the slots fitted.
    pub fn poll<E: FitEngine + ?Sized>(&mut self, engine: &mut E) -> Vec<SlotId> {
        let due = self.scheduler.take_due(self.clock.now());
        let mut fitted = Vec::new();
        for id in due {
            let dirty = self
                .slots
                .get(&id)
                .is_some_and(|slot| slot.state == SlotState::Dirty);
            if dirty {
                self.perform_fit(id, engine);
                fitted.push(id);
            }
        }
        fitted
    }

    pub fn next_refit_due(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;
    use crate::dispatcher::ErrorLevel;
    use crate::fitter::engine::mock::{MockEngine, Scripted};
    use crate::histoer::histogram::Histogram;
    use crate::histoer::peaks::PeakSource;
    use crate::scheduler::ManualClock;

    fn two_lines() -> Histogram {
        let counts = (0..200)
            .map(|i| {
                let x = i as f64 + 0.5;
                let line = |mu: f64| 500.0 * (-0.5 * ((x - mu) / 2.0f64).powi(2)).exp();
                10.0 + line(60.5) + line(140.5)
            })
            .collect();
        Histogram::from_counts("co60", counts, (0.0, 200.0))
    }

    fn session() -> (FitSession<Histogram>, ManualClock) {
        let clock = ManualClock::new();
        let mut session = FitSession::with_clock(
            SessionSettings::default(),
            ErrorDispatcher::new(),
            Rc::new(clock.clone()),
        );
        session.select_histogram(&two_lines());
        (session, clock)
    }

    #[test]
    fn test_add_and_remove_fits() {
        let (mut session, _) = session();
        let first = session.add_fit(Some(60.5), Some(10.0), None);
        let second = session.add_fit(None, None, None);
        let third = session.add_fit(Some(140.5), None, Some(1));

        assert_eq!((first, second, third), (1, 2, 3));
        assert_eq!(session.current(), Some(3));
        let slot = session.slot(first).unwrap();
        assert_eq!(slot.model, "gaus");
        assert_eq!(slot.options, "SQ");
        assert_eq!(slot.state, SlotState::Created);
        assert_eq!(slot.parameters.len(), 3);

        assert_eq!(
            session.list_fits(),
            vec![
                (1, "Fit 1 (60 keV)".to_owned()),
                (2, "Fit 2".to_owned()),
                (3, "Fit 3 (140 keV)".to_owned()),
            ]
        );

        assert!(session.remove_fit(3));
        assert_eq!(session.current(), Some(2));
        assert!(!session.remove_fit(3));
        assert!(session.select(1));
        assert!(!session.select(42));
    }

    #[test]
    fn test_edits_are_debounced() {
        let (mut session, clock) = session();
        let mut engine = MockEngine::new();
        let id = session.add_fit(Some(60.5), Some(10.0), None);

        session.set_energy(id, Some(61.0));
        clock.advance(Duration::from_millis(300));
        session.set_width(id, Some(12.0));
        assert_eq!(session.slot(id).unwrap().state, SlotState::Dirty);

        clock.advance(Duration::from_millis(300));
        assert!(session.poll(&mut engine).is_empty());

        clock.advance(Duration::from_millis(250));
        assert_eq!(session.poll(&mut engine), vec![id]);
        assert_eq!(engine.calls.len(), 1);
        assert_eq!(engine.calls[0].window, (55.0, 67.0));
        assert_eq!(session.slot(id).unwrap().state, SlotState::Complete);
        assert!(session.next_refit_due().is_none());
    }

    #[test]
    fn test_explicit_fit_cancels_pending_refit() {
        let (mut session, clock) = session();
        let mut engine = MockEngine::new();
        let id = session.add_fit(Some(60.5), Some(10.0), None);

        session.set_options(id, "Q");
        session.perform_fit(id, &mut engine);
        clock.advance(Duration::from_secs(1));

        assert!(session.poll(&mut engine).is_empty());
        assert_eq!(engine.calls.len(), 1);
        assert_eq!(engine.calls[0].options, "QS");
    }

    #[test]
    fn test_refit_keeps_one_curve_per_slot() {
        let (mut session, _) = session();
        let mut engine = MockEngine::new();
        let one = session.add_fit(Some(60.5), Some(10.0), None);
        let two = session.add_fit(Some(140.5), Some(10.0), None);

        session.perform_fit(one, &mut engine);
        session.perform_fit(two, &mut engine);
        let slot_two_curve = session.slot(two).unwrap().curve;
        session.perform_fit(one, &mut engine);

        let target = session.target().unwrap();
        let curves = target.curves_for_slot(one);
        assert_eq!(curves.len(), 1);
        assert_eq!(curves[0].name, "fit_gaus_1_2");
        assert_eq!(session.slot(one).unwrap().epoch, 2);
        assert_eq!(session.slot(two).unwrap().curve, slot_two_curve);
        assert!(target.curve(slot_two_curve.unwrap()).is_some());
    }

    #[test]
    fn test_failed_fit_is_isolated() {
        let (mut session, _) = session();
        let mut engine = MockEngine::new();
        let one = session.add_fit(Some(60.5), Some(10.0), None);
        let two = session.add_fit(Some(140.5), Some(10.0), None);

        session.perform_fit(two, &mut engine);
        engine.push(Scripted::Status(4));
        let failed = session.perform_fit(one, &mut engine);

        assert!(failed.error_message().unwrap().starts_with("Fit failed with status 4."));
        let slot = session.slot(one).unwrap();
        assert_eq!(slot.state, SlotState::Failed);
        assert!(slot.curve.is_none());
        assert!(!slot.has_fit());
        assert!(session.slot(two).unwrap().has_fit());
        assert_eq!(session.dispatcher().history(Some(ErrorLevel::Error)).len(), 1);

        session.set_energy(one, Some(61.0));
        assert_eq!(session.slot(one).unwrap().state, SlotState::Dirty);
    }

    #[test]
    fn test_seeds_use_hints_and_explicit_values() {
        let (mut session, _) = session();
        let mut engine = MockEngine::new();
        let id = session.add_fit(Some(60.5), Some(23.55), None);

        session.set_parameter(id, 0, Some(450.0));
        session.set_fixed(id, 2, true);
        session.perform_fit(id, &mut engine);

        let call = &engine.calls[0];
        assert_eq!(call.seeds[0], 450.0);
        assert_eq!(call.seeds[1], 60.5);
        assert!((call.seeds[2] - 10.0).abs() < 1e-9);
        assert_eq!(call.fixed, vec![false, false, true]);
    }

    #[test]
    fn test_model_switch_resets_parameters() {
        let (mut session, _) = session();
        let mut engine = MockEngine::new();
        let id = session.add_fit(Some(60.5), Some(10.0), None);
        session.set_parameter(id, 1, Some(60.0));

        assert!(session.set_model(id, "2gaus+pol1"));
        let slot = session.slot(id).unwrap();
        assert_eq!(slot.parameters.len(), 8);
        assert!(slot.parameters.iter().all(|entry| entry.value.is_none() && !entry.fixed));
        assert_eq!(slot.parameters[6].label, "Bkg a0 (p6)");

        session.perform_fit(id, &mut engine);
        assert_eq!(engine.calls[0].seeds.len(), 8);
        assert_eq!(engine.calls[0].formula, "gaus(0)+gaus(3)+pol1(6)");
        assert!(!session.set_parameter(id, 8, Some(1.0)));
    }

    #[test]
    fn test_non_numeric_input_is_dropped() {
        let (mut session, _) = session();
        let id = session.add_fit(Some(60.5), Some(10.0), None);

        assert!(!session.set_energy_text(id, "sixty"));
        assert!(!session.set_parameter_text(id, 0, "1e"));
        let slot = session.slot(id).unwrap();
        assert_eq!(slot.energy, Some(60.5));
        assert_eq!(slot.state, SlotState::Created);
        assert_eq!(session.dispatcher().history(Some(ErrorLevel::Warning)).len(), 2);

        assert!(session.set_width_text(id, " 12.5 "));
        assert_eq!(session.slot(id).unwrap().width, Some(12.5));
        assert!(session.set_energy_text(id, ""));
        assert_eq!(session.slot(id).unwrap().energy, None);
    }

    #[test]
    fn test_unknown_fit_and_missing_histogram() {
        let mut engine = MockEngine::new();
        let mut empty: FitSession<Histogram> =
            FitSession::new(SessionSettings::default(), ErrorDispatcher::new());
        let id = empty.add_fit(None, None, None);
        assert_eq!(
            empty.perform_fit(id, &mut engine).error_message(),
            Some("No histogram selected for fitting")
        );

        let (mut session, _) = session();
        assert_eq!(
            session.perform_fit(99, &mut engine).error_message(),
            Some("Unknown fit ID: 99")
        );
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn test_non_positive_width_uses_estimated_window() {
        let (mut session, _) = session();
        let mut engine = MockEngine::new();
        let zero = session.add_fit(Some(60.5), Some(0.0), None);
        let negative = session.add_fit(Some(60.5), Some(-20.0), None);
        let missing = session.add_fit(Some(60.5), None, None);

        for id in [zero, negative, missing] {
            assert!(session.perform_fit(id, &mut engine).is_ok());
        }
        for call in &engine.calls {
            assert_eq!(call.window, (55.5, 65.5));
            assert_eq!(call.seeds[0], 510.0);
            assert_eq!(call.seeds[1], 60.5);
            // Half-maximum walk: 57.5 to 63.5
            assert!((call.seeds[2] - 6.0 / 2.355).abs() < 1e-9);
        }
        assert_eq!(engine.calls.len(), 3);
    }

    #[test]
    fn test_window_falls_back_to_histogram_range() {
        let (mut session, _) = session();
        let mut engine = MockEngine::new();
        let id = session.add_fit(None, None, None);
        session.perform_fit(id, &mut engine);
        assert_eq!(engine.calls[0].window, (0.0, 200.0));

        session.set_window(id, Some((50.0, 70.0)));
        session.perform_fit(id, &mut engine);
        assert_eq!(engine.calls[1].window, (50.0, 70.0));
    }

    #[test]
    fn test_fits_for_peaks_and_callback() {
        let (mut session, _) = session();
        let mut engine = MockEngine::new();
        session.add_fit(Some(5.0), None, None);

        let completed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&completed);
        session.set_on_fit_completed(move |id, result| sink.borrow_mut().push((id, result.is_ok())));

        let peaks = [
            Peak {
                energy: 60.5,
                counts: Some(510.0),
                source: PeakSource::Automatic,
            },
            Peak {
                energy: 140.5,
                counts: None,
                source: PeakSource::Manual,
            },
        ];
        let ids = session.add_fits_for_peaks(&peaks, AUTO_FIT_WIDTH);
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(session.len(), 2);
        assert_eq!(session.slot(3).unwrap().peak_index, Some(1));
        assert_eq!(session.slot(3).unwrap().width, Some(AUTO_FIT_WIDTH));

        session.perform_all(&mut engine);
        assert_eq!(*completed.borrow(), vec![(2, true), (3, true)]);

        let records = session.fit_records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.has_fit));
        assert_eq!(records[1].energy, Some(140.5));
    }

    #[test]
    fn test_selecting_a_histogram_resets_the_session() {
        let (mut session, _) = session();
        let mut engine = MockEngine::new();
        let id = session.add_fit(Some(60.5), Some(10.0), None);
        session.perform_fit(id, &mut engine);

        session.select_histogram(&Histogram::new("other", 10, (0.0, 10.0)));
        assert!(session.is_empty());
        assert_eq!(session.target().unwrap().curves().count(), 0);
        assert_eq!(session.histogram().unwrap().name, "other");
    }
}
