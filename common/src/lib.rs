//! Shared ambient layer used by every `tracekit` crate: configuration loading,
//! structured logging, installation identity and the small dynamic-dispatch
//! abstractions (e.g. distance calculation) that the core deliberately keeps
//! swappable.
//!

mod config;
mod distance;
mod identity;
mod logging;
mod macros;

pub use config::{CaptureConfig, ConfigEngine, ConfigError};
pub use distance::{DistanceCalculationStrategy, HaversineStrategy};
pub use identity::InstallationId;
pub use logging::{close_logging, init_logging, LoggingOptions};

/// Implemented by any struct that can be loaded through [`ConfigEngine`].
///
/// The file format carries its own `version` field so that a future,
/// backward-incompatible configuration layout can be detected before the
/// rest of the struct is trusted.
pub trait Versioned {
    fn version(&self) -> usize;
}
