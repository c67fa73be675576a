//! Installation identity: a UUID generated once on first run and persisted in the
//! capture configuration so it survives across process restarts without ever being
//! derived from hardware identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for this installation of the SDK.
///
/// Wrapping `Uuid` rather than exposing it directly keeps the representation free to
/// change (e.g. to a different identifier scheme) without touching every call site.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct InstallationId(Uuid);

impl InstallationId {
    /// Generates a fresh installation identity. Uses UUIDv7 (time-ordered) so installation
    /// identifiers sort roughly by creation time, matching the convention the rest of the
    /// workspace uses for other generated identifiers.
    pub fn generate() -> Self {
        InstallationId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = InstallationId::generate();
        let b = InstallationId::generate();
        assert_ne!(a, b);
    }
}
