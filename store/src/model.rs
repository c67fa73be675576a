//! The entity model (§3): Measurement, Track, Location, Altitude, Event, UploadSession.
//! These are plain owned structs — nothing here borrows from a live database connection, so
//! a `Measurement` returned by [`crate::db::Store::load`] remains valid after the
//! transaction that produced it has committed.

use tracekit_proto::EventKind;

/// One capture session, identified by a device-unique, monotonically assigned identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub id: u64,
    pub start_time: i64,
    pub synchronizable: bool,
    pub synchronized: bool,
    pub schema_version: u32,
    pub tracks: Vec<Track>,
    pub events: Vec<Event>,
}

impl Measurement {
    pub fn new(id: u64, start_time: i64, schema_version: u32) -> Self {
        Measurement {
            id,
            start_time,
            synchronizable: false,
            synchronized: false,
            schema_version,
            tracks: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// A contiguous capture segment, delimited by start/resume on one end and pause/stop on the
/// other.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: i64,
    pub measurement_id: u64,
    pub locations: Vec<Location>,
    pub altitudes: Vec<Altitude>,
}

/// One geographic fix.
#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    pub id: i64,
    pub track_id: i64,
    pub time: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub speed: f64,
    pub altitude: Option<f64>,
    pub vertical_accuracy: Option<f64>,
    /// Derived validity: false when accuracy or lag filtering (C4) rejected the fix.
    pub is_part_of_cleaned_track: bool,
}

/// One barometer-derived relative altitude sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Altitude {
    pub id: i64,
    pub track_id: i64,
    pub value: f64,
    pub time: i64,
}

/// A lifecycle or modality marker.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub id: i64,
    pub measurement_id: u64,
    pub kind: EventKind,
    pub time: i64,
    pub value: Option<String>,
}

/// A server-issued location URL tied to a Measurement, plus the log of HTTP responses seen
/// so far for it.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadSession {
    pub measurement_id: u64,
    pub session_url: String,
    pub created_at: i64,
    pub tasks: Vec<UploadTask>,
}

/// One recorded response to an upload request (initiation or transfer).
#[derive(Clone, Debug, PartialEq)]
pub struct UploadTask {
    pub status_code: u16,
    pub timestamp: i64,
    pub range_start: u64,
    pub range_end: u64,
}

pub(crate) fn event_kind_to_db(kind: EventKind) -> i64 {
    match kind {
        EventKind::LifecycleStart => 0,
        EventKind::LifecycleStop => 1,
        EventKind::LifecyclePause => 2,
        EventKind::LifecycleResume => 3,
        EventKind::ModalityTypeChange => 4,
    }
}

pub(crate) fn event_kind_from_db(v: i64) -> Option<EventKind> {
    Some(match v {
        0 => EventKind::LifecycleStart,
        1 => EventKind::LifecycleStop,
        2 => EventKind::LifecyclePause,
        3 => EventKind::LifecycleResume,
        4 => EventKind::ModalityTypeChange,
        _ => return None,
    })
}
