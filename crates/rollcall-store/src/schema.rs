//! Connection setup and schema.

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const DAY_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS attendance_events (
  event_id TEXT PRIMARY KEY,
  identity_id TEXT NOT NULL,
  day TEXT NOT NULL,
  seq INTEGER NOT NULL CHECK (seq >= 0),
  action TEXT NOT NULL CHECK (action IN ('login', 'logout')),
  recorded_at TEXT NOT NULL,
  confidence REAL,
  terminal_id TEXT,
  UNIQUE (identity_id, day, seq)
);

CREATE INDEX IF NOT EXISTS idx_attendance_events_day
  ON attendance_events(day, recorded_at);

CREATE TRIGGER IF NOT EXISTS trg_attendance_events_no_update
BEFORE UPDATE ON attendance_events
BEGIN
  SELECT RAISE(FAIL, 'attendance_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_attendance_events_no_delete
BEFORE DELETE ON attendance_events
BEGIN
  SELECT RAISE(FAIL, 'attendance_events is append-only');
END;

CREATE TABLE IF NOT EXISTS profiles (
  identity_id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  department TEXT,
  created_at TEXT NOT NULL
);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
}

/// Open (creating if needed) the database at `path` and apply the schema.
pub fn open(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let conn = Connection::open(path)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "database opened");
    prepare(conn)
}

pub fn open_in_memory() -> Result<Connection, StoreError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection, StoreError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(SCHEMA_V1)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/attendance.db");
        drop(open(&path).unwrap());
        let conn = open(&path).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('attendance_events', 'profiles')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
