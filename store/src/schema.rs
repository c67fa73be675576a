//! DDL for a brand-new store, always created directly at [`CURRENT_VERSION`] rather than
//! being walked through the full migration chain — only a store opened from a file written by
//! an older build needs [`crate::migrate`].

use rusqlite::{Connection, Result as SqlResult};

/// Current store schema version. Bumping this requires adding one more step to
/// `crate::migrate::MIGRATIONS`.
pub const CURRENT_VERSION: u32 = 12;

const FRESH_SCHEMA_SQL: &str = r#"
CREATE TABLE kv_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE measurements (
    id              INTEGER PRIMARY KEY,
    start_time      INTEGER NOT NULL,
    synchronizable  INTEGER NOT NULL DEFAULT 0,
    synchronized    INTEGER NOT NULL DEFAULT 0,
    schema_version  INTEGER NOT NULL
);

CREATE TABLE tracks (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    measurement_id INTEGER NOT NULL REFERENCES measurements(id) ON DELETE CASCADE
);

CREATE TABLE locations (
    id                        INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id                  INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    time                      INTEGER NOT NULL,
    latitude                  REAL NOT NULL,
    longitude                 REAL NOT NULL,
    horizontal_accuracy       REAL NOT NULL,
    speed                     REAL NOT NULL,
    altitude                  REAL,
    vertical_accuracy         REAL,
    is_part_of_cleaned_track  INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX idx_locations_track_time ON locations(track_id, time);

CREATE TABLE altitudes (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    value    REAL NOT NULL,
    time     INTEGER NOT NULL
);

CREATE TABLE events (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    measurement_id INTEGER NOT NULL REFERENCES measurements(id) ON DELETE CASCADE,
    kind           INTEGER NOT NULL,
    time           INTEGER NOT NULL,
    value          TEXT
);

CREATE TABLE upload_sessions (
    measurement_id INTEGER PRIMARY KEY REFERENCES measurements(id) ON DELETE CASCADE,
    session_url    TEXT NOT NULL,
    created_at     INTEGER NOT NULL
);

CREATE TABLE upload_tasks (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    measurement_id  INTEGER NOT NULL REFERENCES upload_sessions(measurement_id) ON DELETE CASCADE,
    status_code     INTEGER NOT NULL,
    timestamp       INTEGER NOT NULL,
    range_start     INTEGER NOT NULL,
    range_end       INTEGER NOT NULL
);
"#;

/// Creates every table of the current schema in one transaction and seeds `kv_meta` with a
/// starting measurement-identifier counter.
pub fn create_fresh(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(FRESH_SCHEMA_SQL)?;
    conn.execute(
        "INSERT INTO kv_meta(key, value) VALUES ('schema_version', ?1), ('mid', '0')",
        [CURRENT_VERSION.to_string()],
    )?;
    Ok(())
}

/// Reads the store's schema version from `kv_meta`, or `None` if the database is empty (no
/// `kv_meta` table yet — a pre-v11 store, before the counter table existed).
pub fn read_version(conn: &Connection) -> SqlResult<Option<u32>> {
    let has_kv_meta: bool = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='kv_meta'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)?;
    if !has_kv_meta {
        return Ok(detect_pre_v11_version(conn)?);
    }
    let version: Option<String> = conn
        .query_row("SELECT value FROM kv_meta WHERE key = 'schema_version'", [], |row| row.get(0))
        .ok();
    Ok(version.and_then(|v| v.parse().ok()))
}

/// Before `kv_meta` existed (versions 1 through 10), the version has to be inferred from
/// which tables are present.
fn detect_pre_v11_version(conn: &Connection) -> SqlResult<Option<u32>> {
    let table_exists = |name: &str| -> SqlResult<bool> {
        conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)
    };

    if table_exists("measurements_flat")? {
        return Ok(Some(1));
    }
    if !table_exists("measurements")? {
        return Ok(None);
    }
    if !table_exists("events")? {
        return Ok(Some(2));
    }
    if !table_exists("upload_sessions")? {
        return Ok(Some(3));
    }
    if !table_exists("upload_tasks")? {
        return Ok(Some(4));
    }
    let has_altitude_col = conn
        .prepare("SELECT altitude FROM locations LIMIT 0")
        .is_ok();
    if !has_altitude_col {
        return Ok(Some(5));
    }
    let has_cleaned_col = conn
        .prepare("SELECT is_part_of_cleaned_track FROM locations LIMIT 0")
        .is_ok();
    if !has_cleaned_col {
        return Ok(Some(6));
    }
    let has_location_count = conn
        .prepare("SELECT location_count FROM measurements LIMIT 0")
        .is_ok();
    if has_location_count {
        return Ok(Some(7));
    }
    Ok(Some(10))
}
