//! Error and warning routing for the fitting subsystem.
//!
//! An `ErrorDispatcher` is a cheap, cloneable handle. Sessions, executors and
//! peak lists receive one at construction time and emit into it; callers
//! subscribe handlers per level and drop them again with `unsubscribe`.
//! Every event is mirrored into the `log` facade.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum ErrorLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorLevel::Info => "INFO",
            ErrorLevel::Warning => "WARNING",
            ErrorLevel::Error => "ERROR",
            ErrorLevel::Critical => "CRITICAL",
        }
    }

    fn log_level(&self) -> log::Level {
        match self {
            ErrorLevel::Info => log::Level::Info,
            ErrorLevel::Warning => log::Level::Warn,
            ErrorLevel::Error | ErrorLevel::Critical => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ErrorEvent {
    pub level: ErrorLevel,
    pub message: String,
    pub context: String,
    pub detail: Option<String>,
    pub timestamp: String,
}

impl std::fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.level.as_str(), self.context, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Handler = Rc<dyn Fn(&ErrorEvent)>;

#[derive(Default)]
struct DispatcherState {
    handlers: Vec<(SubscriptionId, ErrorLevel, Handler)>,
    history: VecDeque<ErrorEvent>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct ErrorDispatcher {
    state: Rc<RefCell<DispatcherState>>,
}

impl std::fmt::Debug for ErrorDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ErrorDispatcher")
            .field("handlers", &state.handlers.len())
            .field("history", &state.history.len())
            .finish()
    }
}

impl ErrorDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        level: ErrorLevel,
        handler: impl Fn(&ErrorEvent) + 'static,
    ) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.handlers.push((id, level, Rc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.handlers.len();
        state.handlers.retain(|(handler_id, _, _)| *handler_id != id);
        state.handlers.len() != before
    }

    pub fn emit(
        &self,
        level: ErrorLevel,
        message: impl Into<String>,
        context: &str,
        detail: Option<String>,
    ) -> ErrorEvent {
        let event = ErrorEvent {
            level,
            message: message.into(),
            context: context.to_string(),
            detail,
            timestamp: chrono::Local::now().to_rfc3339(),
        };

        log::log!(level.log_level(), "{}", event);

        // Handlers run without the state borrowed so they may emit themselves.
        let handlers: Vec<Handler> = {
            let mut state = self.state.borrow_mut();
            state.history.push_back(event.clone());
            while state.history.len() > MAX_HISTORY {
                state.history.pop_front();
            }
            state
                .handlers
                .iter()
                .filter(|(_, handler_level, _)| *handler_level == level)
                .map(|(_, _, handler)| Rc::clone(handler))
                .collect()
        };

        for handler in handlers {
            handler(&event);
        }

        event
    }

    pub fn info(&self, message: impl Into<String>, context: &str) -> ErrorEvent {
        self.emit(ErrorLevel::Info, message, context, None)
    }

    pub fn warning(&self, message: impl Into<String>, context: &str) -> ErrorEvent {
        self.emit(ErrorLevel::Warning, message, context, None)
    }

    pub fn error(&self, message: impl Into<String>, context: &str) -> ErrorEvent {
        self.emit(ErrorLevel::Error, message, context, None)
    }

    pub fn history(&self, level: Option<ErrorLevel>) -> Vec<ErrorEvent> {
        let state = self.state.borrow();
        state
            .history
            .iter()
            .filter(|event| level.is_none_or(|level| event.level == level))
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.state.borrow_mut().history.clear();
    }
}
