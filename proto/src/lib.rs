//! The Protobuf wire messages (generated from `proto/tracekit.proto`), the per-measurement
//! sensor-value file store, and the version-prefixed binary serialiser that composes a
//! finished measurement into one transferable payload.

pub mod pb;

mod error;
mod legacy;
mod sensor_file;
mod sensor_value;
mod serialiser;

pub use error::SerialisationError;
pub use sensor_file::{SensorFile, SensorKind};
pub use sensor_value::SensorValue;
pub use serialiser::{decode, encode, EventKind, EventRecord, LocationSample, SerialisedMeasurement, CURRENT_FORMAT_VERSION};
