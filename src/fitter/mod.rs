pub mod curves;
pub mod engine;
pub mod executor;
pub mod format;
pub mod formula;
#[cfg(feature = "lmfit")]
pub mod lmfit;
pub mod models;
pub mod result;
pub mod seeding;
pub mod session;

pub use curves::{CurveKey, FitTarget, FittedCurve, SlotId};
pub use engine::{CancelToken, EngineCall, EngineOutput, FitControl, FitEngine};
pub use executor::{FitExecutor, FitOutcome, FitRequest};
pub use models::CurveModel;
pub use result::{Annotations, FitStats, NormalizedResult, PeakAnnotation};
pub use session::{FitRecord, FitSession, FitSlot, SlotState};
