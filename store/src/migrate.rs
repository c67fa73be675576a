//! The schema migrator (C9): an ordered, numbered chain of steps producing versions
//! 2 through [`crate::schema::CURRENT_VERSION`]. Each step is either a plain DDL statement or
//! a small data transform; `migrate` applies every step between the store's current version
//! and the target inside one transaction, so a store ends up either fully migrated or
//! untouched.

use rusqlite::{Connection, Transaction};

use crate::error::MigrationError;
use crate::schema::{self, CURRENT_VERSION};

/// One named step producing `to_version` from `to_version - 1`.
pub struct Migration {
    pub to_version: u32,
    pub description: &'static str,
    pub apply: fn(&Transaction) -> rusqlite::Result<()>,
}

/// The full chain, in order. `migrate` walks a contiguous slice of this starting just after
/// the store's current version.
pub const MIGRATIONS: &[Migration] = &[
    Migration { to_version: 2, description: "split flat measurement rows into measurements/tracks/locations", apply: v1_to_v2 },
    Migration { to_version: 3, description: "add events table, backfill a lifecycle-start event per measurement", apply: v2_to_v3 },
    Migration { to_version: 4, description: "add upload_sessions table", apply: v3_to_v4 },
    Migration { to_version: 5, description: "add upload_tasks table", apply: v4_to_v5 },
    Migration { to_version: 6, description: "add altitude and vertical_accuracy columns to locations", apply: v5_to_v6 },
    Migration { to_version: 7, description: "add is_part_of_cleaned_track column to locations, default true", apply: v6_to_v7 },
    Migration { to_version: 8, description: "add a cached location_count column to measurements", apply: v7_to_v8 },
    Migration { to_version: 9, description: "drop the derived location_count column, recomputed on demand instead", apply: v8_to_v9 },
    Migration { to_version: 10, description: "add explicit schema_version column to measurements", apply: v9_to_v10 },
    Migration { to_version: 11, description: "introduce kv_meta and the mid identifier counter", apply: v10_to_v11 },
    Migration { to_version: 12, description: "index locations by (track_id, time)", apply: v11_to_v12 },
];

/// Migrates `conn` from whatever version [`schema::read_version`] reports up to
/// [`CURRENT_VERSION`], inside a single transaction. A store already at `CURRENT_VERSION` is
/// untouched. A store reporting a version higher than this build understands is rejected
/// rather than silently truncated.
pub fn migrate(conn: &mut Connection) -> Result<(), MigrationError> {
    let current = schema::read_version(conn)?.unwrap_or(0);

    if current > CURRENT_VERSION {
        return Err(MigrationError::StoreIncompatible { found: current, supported: CURRENT_VERSION });
    }
    if current == CURRENT_VERSION {
        return Ok(());
    }

    let steps: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| m.to_version > current && m.to_version <= CURRENT_VERSION)
        .collect();

    let tx = conn.transaction()?;
    for step in &steps {
        (step.apply)(&tx).map_err(|e| {
            tracing::error!(to_version = step.to_version, error = %e, "migration step failed");
            e
        })?;
        // `kv_meta` itself is only created by the step producing version 11; earlier steps
        // are tracked by `schema::detect_pre_v11_version`'s table/column probing instead.
        if step.to_version >= 11 {
            tx.execute(
                "INSERT INTO kv_meta(key, value) VALUES ('schema_version', ?1) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [step.to_version.to_string()],
            )?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn v1_to_v2(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS measurements (
            id              INTEGER PRIMARY KEY,
            start_time      INTEGER NOT NULL,
            synchronizable  INTEGER NOT NULL DEFAULT 0,
            synchronized    INTEGER NOT NULL DEFAULT 0,
            schema_version  INTEGER NOT NULL DEFAULT 2
         );
         CREATE TABLE tracks (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            measurement_id INTEGER NOT NULL REFERENCES measurements(id) ON DELETE CASCADE
         );
         CREATE TABLE locations (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id            INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            time                INTEGER NOT NULL,
            latitude            REAL NOT NULL,
            longitude           REAL NOT NULL,
            horizontal_accuracy REAL NOT NULL,
            speed               REAL NOT NULL
         );
         CREATE TABLE altitudes (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            value    REAL NOT NULL,
            time     INTEGER NOT NULL
         );",
    )?;

    let flat_exists: i64 = tx.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='measurements_flat'",
        [],
        |row| row.get(0),
    )?;
    if flat_exists > 0 {
        // `start_time_secs` was a fractional Unix-seconds REAL; from v2 on every instant is
        // stored as integer epoch milliseconds.
        tx.execute_batch(
            "INSERT INTO measurements(id, start_time, synchronizable, synchronized, schema_version)
                SELECT id, CAST(start_time_secs * 1000 AS INTEGER), synchronizable, synchronized, 2
                FROM measurements_flat;

             INSERT INTO tracks(measurement_id)
                SELECT id FROM measurements_flat;

             INSERT INTO locations(track_id, time, latitude, longitude, horizontal_accuracy, speed)
                SELECT t.id, CAST(f.start_time_secs * 1000 AS INTEGER), f.lat, f.lon, f.accuracy, f.speed
                FROM measurements_flat f
                JOIN tracks t ON t.measurement_id = f.id;

             DROP TABLE measurements_flat;",
        )?;
    }
    Ok(())
}

fn v2_to_v3(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE events (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            measurement_id INTEGER NOT NULL REFERENCES measurements(id) ON DELETE CASCADE,
            kind           INTEGER NOT NULL,
            time           INTEGER NOT NULL,
            value          TEXT
         );
         INSERT INTO events(measurement_id, kind, time, value)
            SELECT id, 0, start_time, NULL FROM measurements;",
    )
}

fn v3_to_v4(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE upload_sessions (
            measurement_id INTEGER PRIMARY KEY REFERENCES measurements(id) ON DELETE CASCADE,
            session_url    TEXT NOT NULL,
            created_at     INTEGER NOT NULL
         );",
    )
}

fn v4_to_v5(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE upload_tasks (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            measurement_id  INTEGER NOT NULL REFERENCES upload_sessions(measurement_id) ON DELETE CASCADE,
            status_code     INTEGER NOT NULL,
            timestamp       INTEGER NOT NULL,
            range_start     INTEGER NOT NULL,
            range_end       INTEGER NOT NULL
         );",
    )
}

fn v5_to_v6(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "ALTER TABLE locations ADD COLUMN altitude REAL;
         ALTER TABLE locations ADD COLUMN vertical_accuracy REAL;",
    )
}

fn v6_to_v7(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "ALTER TABLE locations ADD COLUMN is_part_of_cleaned_track INTEGER NOT NULL DEFAULT 1;",
    )
}

fn v7_to_v8(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "ALTER TABLE measurements ADD COLUMN location_count INTEGER NOT NULL DEFAULT 0;
         UPDATE measurements SET location_count = (
            SELECT count(*) FROM locations l
            JOIN tracks t ON t.id = l.track_id
            WHERE t.measurement_id = measurements.id
         );",
    )
}

fn v8_to_v9(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch("ALTER TABLE measurements DROP COLUMN location_count;")
}

fn v9_to_v10(tx: &Transaction) -> rusqlite::Result<()> {
    let has_column = tx.prepare("SELECT schema_version FROM measurements LIMIT 0").is_ok();
    if !has_column {
        tx.execute_batch("ALTER TABLE measurements ADD COLUMN schema_version INTEGER NOT NULL DEFAULT 10;")?;
    }
    Ok(())
}

fn v10_to_v11(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE kv_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
         );",
    )?;
    let max_id: Option<i64> = tx.query_row("SELECT max(id) FROM measurements", [], |row| row.get(0)).ok();
    tx.execute(
        "INSERT INTO kv_meta(key, value) VALUES ('mid', ?1)",
        [max_id.unwrap_or(0).to_string()],
    )?;
    Ok(())
}

fn v11_to_v12(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute_batch("CREATE INDEX IF NOT EXISTS idx_locations_track_time ON locations(track_id, time);")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rusqlite::Connection;

    fn seed_v1(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE measurements_flat (
                id INTEGER PRIMARY KEY,
                start_time_secs REAL NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                accuracy REAL NOT NULL,
                speed REAL NOT NULL,
                synchronizable INTEGER NOT NULL DEFAULT 0,
                synchronized INTEGER NOT NULL DEFAULT 0
             );
             INSERT INTO measurements_flat(id, start_time_secs, lat, lon, accuracy, speed)
                VALUES (1, 1000.0, 50.85, 4.35, 5.0, 1.2);",
        )
        .unwrap();
    }

    #[test]
    fn migrating_from_v1_reaches_current_version_with_data_preserved() {
        let mut conn = Connection::open_in_memory().unwrap();
        seed_v1(&conn);
        migrate(&mut conn).unwrap();

        let version = schema::read_version(&conn).unwrap();
        assert_eq!(version, Some(CURRENT_VERSION));

        let (lat, lon): (f64, f64) = conn
            .query_row("SELECT latitude, longitude FROM locations", [], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert!((lat - 50.85).abs() < 1e-9);
        assert!((lon - 4.35).abs() < 1e-9);

        let event_count: i64 = conn.query_row("SELECT count(*) FROM events", [], |row| row.get(0)).unwrap();
        assert_eq!(event_count, 1);
    }

    #[test]
    fn migrating_a_store_already_at_current_version_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::create_fresh(&conn).unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(schema::read_version(&conn).unwrap(), Some(CURRENT_VERSION));
    }

    #[rstest]
    #[case::one_ahead(1)]
    #[case::far_ahead(7)]
    fn store_newer_than_supported_is_rejected(#[case] ahead_by: i64) {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_fresh(&conn).unwrap();
        conn.execute(
            "UPDATE kv_meta SET value = ?1 WHERE key = 'schema_version'",
            [(CURRENT_VERSION + ahead_by).to_string()],
        )
        .unwrap();

        let mut conn = conn;
        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, MigrationError::StoreIncompatible { .. }));
    }
}
