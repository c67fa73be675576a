use thiserror::Error;

/// The *Persistence* error taxonomy (§7). Retried by the caller only if the cause is
/// transient (currently: none of these are — a `Sqlite` busy/locked error is retried
/// internally by `db`, not surfaced here); otherwise surfaced as-is.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("measurement {0} could not be loaded")]
    MeasurementNotLoadable(u64),
    #[error("track {0} could not be loaded")]
    TrackNotLoadable(i64),
    #[error("location/altitude data for track {0} could not be loaded")]
    DataNotLoadable(i64),
    #[error("store is in an inconsistent state: {0}")]
    InconsistentState(String),
    #[error("measurement {0} is not synchronizable yet")]
    UnsynchronizedMeasurement(u64),
    #[error("no upload session registered for measurement {0}")]
    SessionNotRegistered(u64),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database worker task panicked")]
    WorkerPanicked,
}

/// The *Migration* error taxonomy (§7). Both variants are fatal: the store is left at its
/// prior version and the caller must not proceed.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no migration step produces version {0}")]
    MappingMissing(u32),
    #[error("store schema version {found} is newer than this build supports ({supported})")]
    StoreIncompatible { found: u32, supported: u32 },
    #[error("sqlite error during migration: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
