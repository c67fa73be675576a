use thiserror::Error;

/// Collapses every crate's own error taxonomy into one CLI-facing type; `main` reports it
/// via `eyre`'s report formatting rather than matching on it.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] tracekit_common::ConfigError),
    #[error(transparent)]
    Persistence(#[from] tracekit_store::PersistenceError),
    #[error(transparent)]
    Lifecycle(#[from] tracekit_capture::LifecycleError),
    #[error(transparent)]
    Upload(#[from] tracekit_upload::UploadError),
    #[error("measurement {0} not found")]
    MeasurementNotFound(u64),
}
