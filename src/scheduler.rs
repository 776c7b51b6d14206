//! Cooperative, single-threaded task scheduling used to debounce refits.
//!
//! Nothing runs in the background: the owner calls `take_due` from its own
//! event loop (or from `FitSession::poll`) and executes whatever is returned.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Shared by cloning.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancelled: Rc<Cell<bool>>,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

#[derive(Debug)]
struct ScheduledTask<T> {
    due: Instant,
    handle: TaskHandle,
    payload: T,
}

#[derive(Debug)]
pub struct Scheduler<T> {
    tasks: Vec<ScheduledTask<T>>,
    next_id: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, payload: T) -> TaskHandle {
        let handle = TaskHandle {
            id: self.next_id,
            cancelled: Rc::new(Cell::new(false)),
        };
        self.next_id += 1;
        self.tasks.push(ScheduledTask {
            due,
            handle: handle.clone(),
            payload,
        });
        handle
    }

    /// Removes and returns every live task due at or before `now`, oldest
    /// deadline first. Cancelled tasks are dropped silently.
    pub fn take_due(&mut self, now: Instant) -> Vec<T> {
        self.tasks.retain(|task| !task.handle.is_cancelled());

        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|task| task.due <= now);
        self.tasks = pending;

        due.sort_by_key(|task| (task.due, task.handle.id));
        due.into_iter().map(|task| task.payload).collect()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.tasks
            .iter()
            .filter(|task| !task.handle.is_cancelled())
            .map(|task| task.due)
            .min()
    }

    pub fn pending(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| !task.handle.is_cancelled())
            .count()
    }

    pub fn clear(&mut self) {
        for task in &self.tasks {
            task.handle.cancel();
        }
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_tasks_fire_in_deadline_order() {
        let clock = ManualClock::new();
        let mut scheduler = Scheduler::new();
        let start = clock.now();
        scheduler.schedule(start + Duration::from_millis(200), "late");
        scheduler.schedule(start + Duration::from_millis(100), "early");

        assert!(scheduler.take_due(clock.now()).is_empty());
        clock.advance(Duration::from_millis(250));
        assert_eq!(scheduler.take_due(clock.now()), vec!["early", "late"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_cancelled_task_never_fires() {
        let clock = ManualClock::new();
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(clock.now() + Duration::from_millis(500), 1);
        let keep = scheduler.schedule(clock.now() + Duration::from_millis(600), 2);

        handle.cancel();
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(
            scheduler.next_due(),
            Some(clock.now() + Duration::from_millis(600))
        );

        clock.advance(Duration::from_secs(1));
        assert_eq!(scheduler.take_due(clock.now()), vec![2]);
        assert!(!keep.is_cancelled());
    }

    #[test]
    fn test_clear_cancels_handles() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(Instant::now(), ());
        scheduler.clear();
        assert!(handle.is_cancelled());
        assert!(scheduler.next_due().is_none());
    }
}
