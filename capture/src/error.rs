use thiserror::Error;

use tracekit_store::PersistenceError;

/// The *Lifecycle* error taxonomy (§7): returned synchronously to the caller of
/// [`crate::lifecycle::Lifecycle`]; never fatal to the pipeline itself.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("a measurement is already running")]
    IsRunning,
    #[error("no measurement is running")]
    NotRunning,
    #[error("the running measurement is already paused")]
    IsPaused,
    #[error("the running measurement is not paused")]
    NotPaused,
    #[error(transparent)]
    Store(#[from] PersistenceError),
    #[error("flush failed before lifecycle transition: {0}")]
    Flush(String),
}
