//! The measurement store (C3): transactional CRUD over the entity model, plus measurement
//! identifier allocation (§4.9) and the upload-session registry consumed by `tracekit-upload`.
//!
//! Every public method is `async` and funnels through a single `spawn_blocking` call guarded
//! by one `std::sync::Mutex<Connection>` — a serialised write queue: at most one logical
//! writer is ever active, rather than a pool a caller could bypass.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracekit_proto::{SensorFile, SensorKind};
use tracing::{instrument, warn};

use crate::error::PersistenceError;
use crate::model::{
    event_kind_from_db, event_kind_to_db, Altitude, Event, Location, Measurement, Track,
    UploadSession, UploadTask,
};
use crate::schema;
use crate::EventKind;

/// Fields required to append a new [`Location`]; `id` and `track_id` are assigned by the
/// store.
#[derive(Clone, Debug, PartialEq)]
pub struct NewLocation {
    pub time: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub speed: f64,
    pub altitude: Option<f64>,
    pub vertical_accuracy: Option<f64>,
    pub is_part_of_cleaned_track: bool,
}

/// Fields required to append a new [`Altitude`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewAltitude {
    pub value: f64,
    pub time: i64,
}

/// The entity store. Cheap to clone: cloning shares the same underlying connection and
/// measurement-file directory.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    measurements_dir: PathBuf,
}

impl Store {
    /// Opens (creating if absent) the SQLite file at `path`, creating a fresh schema or
    /// migrating an existing one up to [`schema::CURRENT_VERSION`]. `measurements_dir` is the
    /// root under which C2 sensor files for each measurement live (§6: `<app-support>/measurements/`).
    #[instrument(skip(path, measurements_dir))]
    pub fn open(path: impl AsRef<Path>, measurements_dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;

        match schema::read_version(&conn)? {
            None => schema::create_fresh(&conn)?,
            Some(_) => crate::migrate::migrate(&mut conn)?,
        }

        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
            measurements_dir: measurements_dir.into(),
        })
    }

    /// Opens an in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::create_fresh(&conn)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
            measurements_dir: std::env::temp_dir().join("tracekit-measurements"),
        })
    }

    fn measurement_dir(&self, id: u64) -> PathBuf {
        self.measurements_dir.join(id.to_string())
    }

    /// Runs `f` against the guarded connection on a blocking thread, mapping a panicked
    /// worker onto [`PersistenceError::WorkerPanicked`].
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        F: FnOnce(&Connection) -> Result<T, PersistenceError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("store mutex poisoned");
            f(&conn)
        })
        .await
        .map_err(|_| PersistenceError::WorkerPanicked)?
    }

    /// Same as [`Self::with_conn`] but hands the closure a read-write `Transaction`, committing
    /// on `Ok` and rolling back (implicitly, on drop) on `Err`.
    async fn with_tx<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        F: FnOnce(&Transaction) -> Result<T, PersistenceError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("store mutex poisoned");
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(|_| PersistenceError::WorkerPanicked)?
    }

    /// Allocates the next free measurement identifier from the `mid` counter in `kv_meta`,
    /// incrementing past any collision with a pre-existing row (§4.9, §8 scenario 6).
    fn next_measurement_id(tx: &Transaction) -> rusqlite::Result<u64> {
        loop {
            let current: i64 = tx.query_row("SELECT value FROM kv_meta WHERE key = 'mid'", [], |row| {
                row.get::<_, String>(0).map(|v| v.parse().unwrap_or(0))
            })?;
            let candidate = current + 1;
            tx.execute(
                "UPDATE kv_meta SET value = ?1 WHERE key = 'mid'",
                [candidate.to_string()],
            )?;

            let taken: bool = tx
                .query_row("SELECT count(*) FROM measurements WHERE id = ?1", [candidate], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n > 0)?;
            if !taken {
                return Ok(candidate as u64);
            }
            warn!(candidate, "measurement id collision, retrying");
        }
    }

    /// Creates a new measurement, recording its initial MODALITY_TYPE_CHANGE event at
    /// `time`.
    #[instrument(skip(self))]
    pub async fn create_measurement(&self, time: i64, initial_modality: &str) -> Result<Measurement, PersistenceError> {
        let modality = initial_modality.to_string();
        self.with_tx(move |tx| {
            let id = Store::next_measurement_id(tx)?;
            tx.execute(
                "INSERT INTO measurements(id, start_time, synchronizable, synchronized, schema_version) \
                 VALUES (?1, ?2, 0, 0, ?3)",
                params![id as i64, time, schema::CURRENT_VERSION],
            )?;
            tx.execute(
                "INSERT INTO events(measurement_id, kind, time, value) VALUES (?1, ?2, ?3, ?4)",
                params![id as i64, event_kind_to_db(EventKind::ModalityTypeChange), time, modality],
            )?;
            Ok(Measurement::new(id, time, schema::CURRENT_VERSION))
        })
        .await
    }

    /// Appends a new, empty track to `measurement_id` (on START or on each RESUME).
    #[instrument(skip(self))]
    pub async fn append_track(&self, measurement_id: u64) -> Result<Track, PersistenceError> {
        self.with_tx(move |tx| {
            tx.execute(
                "INSERT INTO tracks(measurement_id) VALUES (?1)",
                [measurement_id as i64],
            )?;
            let id = tx.last_insert_rowid();
            Ok(Track { id, measurement_id, locations: Vec::new(), altitudes: Vec::new() })
        })
        .await
    }

    #[instrument(skip(self, location))]
    pub async fn append_location(&self, track_id: i64, location: NewLocation) -> Result<Location, PersistenceError> {
        self.with_tx(move |tx| {
            tx.execute(
                "INSERT INTO locations(track_id, time, latitude, longitude, horizontal_accuracy, speed, \
                 altitude, vertical_accuracy, is_part_of_cleaned_track) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    track_id,
                    location.time,
                    location.latitude,
                    location.longitude,
                    location.horizontal_accuracy,
                    location.speed,
                    location.altitude,
                    location.vertical_accuracy,
                    location.is_part_of_cleaned_track as i64,
                ],
            )?;
            let id = tx.last_insert_rowid();
            Ok(Location {
                id,
                track_id,
                time: location.time,
                latitude: location.latitude,
                longitude: location.longitude,
                horizontal_accuracy: location.horizontal_accuracy,
                speed: location.speed,
                altitude: location.altitude,
                vertical_accuracy: location.vertical_accuracy,
                is_part_of_cleaned_track: location.is_part_of_cleaned_track,
            })
        })
        .await
    }

    #[instrument(skip(self, altitude))]
    pub async fn append_altitude(&self, track_id: i64, altitude: NewAltitude) -> Result<Altitude, PersistenceError> {
        self.with_tx(move |tx| {
            tx.execute(
                "INSERT INTO altitudes(track_id, value, time) VALUES (?1, ?2, ?3)",
                params![track_id, altitude.value, altitude.time],
            )?;
            let id = tx.last_insert_rowid();
            Ok(Altitude { id, track_id, value: altitude.value, time: altitude.time })
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn append_event(
        &self,
        measurement_id: u64,
        kind: EventKind,
        time: i64,
        value: Option<String>,
    ) -> Result<Event, PersistenceError> {
        self.with_tx(move |tx| {
            tx.execute(
                "INSERT INTO events(measurement_id, kind, time, value) VALUES (?1, ?2, ?3, ?4)",
                params![measurement_id as i64, event_kind_to_db(kind), time, value],
            )?;
            let id = tx.last_insert_rowid();
            Ok(Event { id, measurement_id, kind, time, value })
        })
        .await
    }

    /// Flips `synchronizable` false→true. No-op if already true.
    #[instrument(skip(self))]
    pub async fn mark_synchronizable(&self, id: u64) -> Result<(), PersistenceError> {
        self.with_conn(move |conn| {
            conn.execute("UPDATE measurements SET synchronizable = 1 WHERE id = ?1", [id as i64])?;
            Ok(())
        })
        .await
    }

    /// Flips `synchronized` false→true. Fails with [`PersistenceError::UnsynchronizedMeasurement`]
    /// if the measurement is not yet `synchronizable`.
    #[instrument(skip(self))]
    pub async fn mark_synchronized(&self, id: u64) -> Result<(), PersistenceError> {
        self.with_conn(move |conn| {
            let synchronizable: bool = conn
                .query_row("SELECT synchronizable FROM measurements WHERE id = ?1", [id as i64], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()?
                .map(|v| v != 0)
                .ok_or(PersistenceError::MeasurementNotLoadable(id))?;
            if !synchronizable {
                return Err(PersistenceError::UnsynchronizedMeasurement(id));
            }
            conn.execute("UPDATE measurements SET synchronized = 1 WHERE id = ?1", [id as i64])?;
            Ok(())
        })
        .await
    }

    /// Deep-loads one measurement: its tracks (each with its locations and altitudes) and
    /// events, ordered by time.
    #[instrument(skip(self))]
    pub async fn load(&self, id: u64) -> Result<Measurement, PersistenceError> {
        self.with_conn(move |conn| Self::load_deep(conn, id)).await
    }

    fn load_deep(conn: &Connection, id: u64) -> Result<Measurement, PersistenceError> {
        let (start_time, synchronizable, synchronized, schema_version) = conn
            .query_row(
                "SELECT start_time, synchronizable, synchronized, schema_version FROM measurements WHERE id = ?1",
                [id as i64],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)? != 0,
                        row.get::<_, i64>(2)? != 0,
                        row.get::<_, i64>(3)? as u32,
                    ))
                },
            )
            .optional()?
            .ok_or(PersistenceError::MeasurementNotLoadable(id))?;

        let mut measurement = Measurement { id, start_time, synchronizable, synchronized, schema_version, tracks: Vec::new(), events: Vec::new() };

        let mut track_stmt = conn.prepare("SELECT id FROM tracks WHERE measurement_id = ?1 ORDER BY id")?;
        let track_ids: Vec<i64> = track_stmt
            .query_map([id as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(track_stmt);

        for track_id in track_ids {
            measurement.tracks.push(Self::load_track(conn, track_id)?);
        }

        let mut event_stmt = conn.prepare(
            "SELECT id, kind, time, value FROM events WHERE measurement_id = ?1 ORDER BY time, id",
        )?;
        let events = event_stmt
            .query_map([id as i64], |row| {
                let kind_raw: i64 = row.get(1)?;
                Ok((row.get::<_, i64>(0)?, kind_raw, row.get::<_, i64>(2)?, row.get::<_, Option<String>>(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(event_stmt);

        for (ev_id, kind_raw, time, value) in events {
            let kind = event_kind_from_db(kind_raw)
                .ok_or_else(|| PersistenceError::InconsistentState(format!("unknown event kind {kind_raw}")))?;
            measurement.events.push(Event { id: ev_id, measurement_id: id, kind, time, value });
        }

        Ok(measurement)
    }

    fn load_track(conn: &Connection, track_id: i64) -> Result<Track, PersistenceError> {
        let measurement_id: i64 = conn
            .query_row("SELECT measurement_id FROM tracks WHERE id = ?1", [track_id], |row| row.get(0))
            .optional()?
            .ok_or(PersistenceError::TrackNotLoadable(track_id))?;

        let mut loc_stmt = conn.prepare(
            "SELECT id, time, latitude, longitude, horizontal_accuracy, speed, altitude, vertical_accuracy, \
             is_part_of_cleaned_track FROM locations WHERE track_id = ?1 ORDER BY time, id",
        ).map_err(|_| PersistenceError::DataNotLoadable(track_id))?;
        let locations = loc_stmt
            .query_map([track_id], |row| {
                Ok(Location {
                    id: row.get(0)?,
                    track_id,
                    time: row.get(1)?,
                    latitude: row.get(2)?,
                    longitude: row.get(3)?,
                    horizontal_accuracy: row.get(4)?,
                    speed: row.get(5)?,
                    altitude: row.get(6)?,
                    vertical_accuracy: row.get(7)?,
                    is_part_of_cleaned_track: row.get::<_, i64>(8)? != 0,
                })
            })
            .map_err(|_| PersistenceError::DataNotLoadable(track_id))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|_| PersistenceError::DataNotLoadable(track_id))?;
        drop(loc_stmt);

        let mut alt_stmt = conn
            .prepare("SELECT id, value, time FROM altitudes WHERE track_id = ?1 ORDER BY time, id")
            .map_err(|_| PersistenceError::DataNotLoadable(track_id))?;
        let altitudes = alt_stmt
            .query_map([track_id], |row| {
                Ok(Altitude { id: row.get(0)?, track_id, value: row.get(1)?, time: row.get(2)? })
            })
            .map_err(|_| PersistenceError::DataNotLoadable(track_id))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|_| PersistenceError::DataNotLoadable(track_id))?;

        Ok(Track { id: track_id, measurement_id: measurement_id as u64, locations, altitudes })
    }

    /// Loads every measurement in the store, deeply.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<Measurement>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT id FROM measurements ORDER BY id")?;
            let ids: Vec<i64> = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
            drop(stmt);
            ids.into_iter().map(|id| Self::load_deep(conn, id as u64)).collect()
        })
        .await
    }

    /// Loads measurements that are `synchronizable` and not yet `synchronized`.
    #[instrument(skip(self))]
    pub async fn load_synchronizable(&self) -> Result<Vec<Measurement>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM measurements WHERE synchronizable = 1 AND synchronized = 0 ORDER BY id",
            )?;
            let ids: Vec<i64> = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
            drop(stmt);
            ids.into_iter().map(|id| Self::load_deep(conn, id as u64)).collect()
        })
        .await
    }

    /// Loads a measurement's events, optionally filtered to one [`EventKind`].
    #[instrument(skip(self))]
    pub async fn load_events(&self, id: u64, kind: Option<EventKind>) -> Result<Vec<Event>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, time, value FROM events WHERE measurement_id = ?1 ORDER BY time, id",
            )?;
            let rows = stmt
                .query_map([id as i64], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?, row.get::<_, Option<String>>(3)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut out = Vec::new();
            for (ev_id, kind_raw, time, value) in rows {
                let ev_kind = event_kind_from_db(kind_raw)
                    .ok_or_else(|| PersistenceError::InconsistentState(format!("unknown event kind {kind_raw}")))?;
                if kind.is_none() || kind == Some(ev_kind) {
                    out.push(Event { id: ev_id, measurement_id: id, kind: ev_kind, time, value });
                }
            }
            Ok(out)
        })
        .await
    }

    /// Deletes a measurement and every entity it owns, plus its three C2 sensor files (and
    /// their now-empty parent directory).
    #[instrument(skip(self))]
    pub async fn delete(&self, id: u64) -> Result<(), PersistenceError> {
        let dir = self.measurement_dir(id);
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM measurements WHERE id = ?1", [id as i64])?;
            Ok(())
        })
        .await?;

        for kind in [SensorKind::Acceleration, SensorKind::Rotation, SensorKind::Direction] {
            SensorFile::new(&dir, kind)
                .delete()
                .map_err(|e| PersistenceError::InconsistentState(format!("deleting sensor file: {e}")))?;
        }
        Ok(())
    }

    /// Returns the directory C2 sensor files for `id` live under.
    pub fn sensor_dir(&self, id: u64) -> PathBuf {
        self.measurement_dir(id)
    }

    // --- Upload session registry (consumed by `tracekit-upload`, C7) -----------------------

    #[instrument(skip(self))]
    pub async fn register_session(&self, measurement_id: u64, session_url: &str, created_at: i64) -> Result<(), PersistenceError> {
        let session_url = session_url.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO upload_sessions(measurement_id, session_url, created_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(measurement_id) DO UPDATE SET session_url = excluded.session_url",
                params![measurement_id as i64, session_url, created_at],
            )?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn load_session(&self, measurement_id: u64) -> Result<Option<UploadSession>, PersistenceError> {
        self.with_conn(move |conn| {
            let head = conn
                .query_row(
                    "SELECT session_url, created_at FROM upload_sessions WHERE measurement_id = ?1",
                    [measurement_id as i64],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;
            let Some((session_url, created_at)) = head else { return Ok(None) };

            let mut stmt = conn.prepare(
                "SELECT status_code, timestamp, range_start, range_end FROM upload_tasks \
                 WHERE measurement_id = ?1 ORDER BY id",
            )?;
            let tasks = stmt
                .query_map([measurement_id as i64], |row| {
                    Ok(UploadTask {
                        status_code: row.get::<_, i64>(0)? as u16,
                        timestamp: row.get(1)?,
                        range_start: row.get::<_, i64>(2)? as u64,
                        range_end: row.get::<_, i64>(3)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Some(UploadSession { measurement_id, session_url, created_at, tasks }))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn append_upload_task(&self, measurement_id: u64, task: UploadTask) -> Result<(), PersistenceError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO upload_tasks(measurement_id, status_code, timestamp, range_start, range_end) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![measurement_id as i64, task.status_code as i64, task.timestamp, task.range_start as i64, task.range_end as i64],
            )?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_session(&self, measurement_id: u64) -> Result<(), PersistenceError> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM upload_sessions WHERE measurement_id = ?1", [measurement_id as i64])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn monotone_identifiers_across_many_creates() {
        let store = new_store().await;
        let mut ids = Vec::new();
        for _ in 0..20 {
            let m = store.create_measurement(0, "WALKING").await.unwrap();
            ids.push(m.id);
        }
        for w in ids.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[tokio::test]
    async fn identifier_collision_skips_pre_seeded_id() {
        let store = new_store().await;
        for _ in 0..6 {
            store.create_measurement(0, "WALKING").await.unwrap();
        }
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO measurements(id, start_time, synchronizable, synchronized, schema_version) \
                     VALUES (7, 0, 0, 0, 12)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let m = store.create_measurement(0, "WALKING").await.unwrap();
        assert_eq!(m.id, 8);
    }

    #[tokio::test]
    async fn create_measurement_records_initial_modality_event() {
        let store = new_store().await;
        let m = store.create_measurement(100, "BICYCLE").await.unwrap();
        let loaded = store.load(m.id).await.unwrap();
        assert_eq!(loaded.events.len(), 1);
        assert_eq!(loaded.events[0].kind, EventKind::ModalityTypeChange);
        assert_eq!(loaded.events[0].value.as_deref(), Some("BICYCLE"));
    }

    #[tokio::test]
    async fn pause_resume_scenario_builds_two_tracks() {
        let store = new_store().await;
        let m = store.create_measurement(0, "BICYCLE").await.unwrap();
        let track1 = store.append_track(m.id).await.unwrap();
        store
            .append_location(
                track1.id,
                NewLocation {
                    time: 100,
                    latitude: 1.0,
                    longitude: 1.0,
                    horizontal_accuracy: 1.0,
                    speed: 1.0,
                    altitude: None,
                    vertical_accuracy: None,
                    is_part_of_cleaned_track: true,
                },
            )
            .await
            .unwrap();
        let track2 = store.append_track(m.id).await.unwrap();
        assert_ne!(track1.id, track2.id);

        let loaded = store.load(m.id).await.unwrap();
        assert_eq!(loaded.tracks.len(), 2);
        assert_eq!(loaded.tracks[0].locations.len(), 1);
        assert_eq!(loaded.tracks[1].locations.len(), 0);
    }

    #[tokio::test]
    async fn synchronized_requires_synchronizable_first() {
        let store = new_store().await;
        let m = store.create_measurement(0, "WALKING").await.unwrap();
        let err = store.mark_synchronized(m.id).await.unwrap_err();
        assert!(matches!(err, PersistenceError::UnsynchronizedMeasurement(_)));

        store.mark_synchronizable(m.id).await.unwrap();
        store.mark_synchronized(m.id).await.unwrap();
        let loaded = store.load(m.id).await.unwrap();
        assert!(loaded.synchronizable);
        assert!(loaded.synchronized);
    }

    #[tokio::test]
    async fn load_synchronizable_excludes_already_synchronized() {
        let store = new_store().await;
        let a = store.create_measurement(0, "WALKING").await.unwrap();
        let b = store.create_measurement(0, "WALKING").await.unwrap();
        store.mark_synchronizable(a.id).await.unwrap();
        store.mark_synchronizable(b.id).await.unwrap();
        store.mark_synchronized(b.id).await.unwrap();

        let pending = store.load_synchronizable().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
    }

    #[tokio::test]
    async fn accuracy_filtered_location_is_still_persisted_but_flagged() {
        let store = new_store().await;
        let m = store.create_measurement(0, "CAR").await.unwrap();
        let track = store.append_track(m.id).await.unwrap();
        store
            .append_location(
                track.id,
                NewLocation {
                    time: 0,
                    latitude: 50.0,
                    longitude: 4.0,
                    horizontal_accuracy: 25.0,
                    speed: 0.0,
                    altitude: None,
                    vertical_accuracy: None,
                    is_part_of_cleaned_track: false,
                },
            )
            .await
            .unwrap();

        let loaded = store.load(m.id).await.unwrap();
        let all_locations = &loaded.tracks[0].locations;
        assert_eq!(all_locations.len(), 1);
        let cleaned: Vec<_> = all_locations.iter().filter(|l| l.is_part_of_cleaned_track).collect();
        assert!(cleaned.is_empty());
    }

    #[tokio::test]
    async fn upload_session_round_trips_through_registry() {
        let store = new_store().await;
        let m = store.create_measurement(0, "WALKING").await.unwrap();
        store.register_session(m.id, "https://collector.example/s/42", 1_000).await.unwrap();
        store
            .append_upload_task(m.id, UploadTask { status_code: 308, timestamp: 1_001, range_start: 0, range_end: 99 })
            .await
            .unwrap();

        let session = store.load_session(m.id).await.unwrap().expect("session registered");
        assert_eq!(session.session_url, "https://collector.example/s/42");
        assert_eq!(session.tasks.len(), 1);
        assert_eq!(session.tasks[0].status_code, 308);

        store.delete_session(m.id).await.unwrap();
        assert!(store.load_session(m.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_tracks_locations_and_events() {
        let store = new_store().await;
        let m = store.create_measurement(0, "WALKING").await.unwrap();
        let track = store.append_track(m.id).await.unwrap();
        store
            .append_location(
                track.id,
                NewLocation {
                    time: 0,
                    latitude: 0.0,
                    longitude: 0.0,
                    horizontal_accuracy: 1.0,
                    speed: 0.0,
                    altitude: None,
                    vertical_accuracy: None,
                    is_part_of_cleaned_track: true,
                },
            )
            .await
            .unwrap();

        store.delete(m.id).await.unwrap();
        let err = store.load(m.id).await.unwrap_err();
        assert!(matches!(err, PersistenceError::MeasurementNotLoadable(_)));
    }
}
