//! The measurement store (C3) and schema migrator (C9): a single SQLite file, managed
//! through `rusqlite`, holding the Measurement/Track/Location/Altitude/Event/UploadSession
//! entity model (§3) behind a transactional, serialised-writer API.

mod db;
mod error;
mod migrate;
mod model;
mod schema;

pub use db::{NewAltitude, NewLocation, Store};
pub use error::{MigrationError, PersistenceError};
pub use migrate::{migrate, Migration, MIGRATIONS};
pub use model::{Altitude, Event, Location, Measurement, Track, UploadSession, UploadTask};
pub use schema::CURRENT_VERSION;

pub use tracekit_proto::EventKind;
