//! The capture subsystem: the sampling pipeline (C4) and measurement lifecycle (C5) that turn
//! raw sensor callbacks into persisted Measurements via `tracekit-store`.

mod clock;
mod error;
mod lifecycle;
mod pipeline;
mod session;

pub use clock::{Clock, SystemClock};
pub use error::LifecycleError;
pub use lifecycle::{Lifecycle, LifecycleMessage};
pub use pipeline::{FlushError, Pipeline, PipelineConfig, RawFix};
pub use session::Session;
