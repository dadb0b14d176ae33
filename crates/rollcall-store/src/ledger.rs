//! SQLite attendance ledger.
//!
//! Each event occupies position `seq` within its `(identity_id, day)`.
//! A conditional append checks the stored count and last action inside a
//! `BEGIN IMMEDIATE` transaction and inserts at `seq = prior_count`; the
//! `UNIQUE (identity_id, day, seq)` constraint backs this up so two
//! processes on one file can never both claim the same position.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use std::path::Path;

use rollcall_core::{Action, AttendanceEvent, Ledger, LedgerError, Precondition};

use crate::schema::{self, StoreError, DAY_FORMAT, TIMESTAMP_FORMAT};

const SELECT_COLUMNS: &str =
    "SELECT identity_id, recorded_at, action, confidence, terminal_id FROM attendance_events";

pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: schema::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: schema::open_in_memory()?,
        })
    }

    fn query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AttendanceEvent>, LedgerError> {
        let mut stmt = self.conn.prepare(sql).map_err(map_sqlite)?;
        let rows = stmt.query_map(params, read_row).map_err(map_sqlite)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(map_sqlite)??);
        }
        Ok(events)
    }
}

type RowResult = Result<AttendanceEvent, LedgerError>;

fn read_row(row: &Row<'_>) -> rusqlite::Result<RowResult> {
    let identity_id: String = row.get(0)?;
    let recorded_at: String = row.get(1)?;
    let action: String = row.get(2)?;
    let confidence: Option<f64> = row.get(3)?;
    let terminal_id: Option<String> = row.get(4)?;

    let timestamp = match NaiveDateTime::parse_from_str(&recorded_at, TIMESTAMP_FORMAT) {
        Ok(ts) => ts,
        Err(e) => return Ok(Err(LedgerError::Corrupt(format!("recorded_at {recorded_at:?}: {e}")))),
    };
    let action = match action.parse::<Action>() {
        Ok(a) => a,
        Err(e) => return Ok(Err(LedgerError::Corrupt(e))),
    };

    Ok(Ok(AttendanceEvent {
        identity_id,
        timestamp,
        action,
        confidence: confidence.map(|c| c as f32),
        terminal_id,
    }))
}

fn map_sqlite(err: rusqlite::Error) -> LedgerError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            LedgerError::Unavailable(format!("database busy: {err}"))
        }
        Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => {
            LedgerError::Corrupt(err.to_string())
        }
        _ => LedgerError::Unavailable(err.to_string()),
    }
}

fn day_key(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

impl Ledger for SqliteLedger {
    fn history(
        &self,
        identity_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceEvent>, LedgerError> {
        match date {
            Some(date) => self.query(
                &format!("{SELECT_COLUMNS} WHERE identity_id = ?1 AND day = ?2 ORDER BY day, seq"),
                params![identity_id, day_key(date)],
            ),
            None => self.query(
                &format!("{SELECT_COLUMNS} WHERE identity_id = ?1 ORDER BY day, seq"),
                params![identity_id],
            ),
        }
    }

    fn scan(&self, date: Option<NaiveDate>) -> Result<Vec<AttendanceEvent>, LedgerError> {
        match date {
            Some(date) => self.query(
                &format!("{SELECT_COLUMNS} WHERE day = ?1 ORDER BY recorded_at"),
                params![day_key(date)],
            ),
            None => self.query(&format!("{SELECT_COLUMNS} ORDER BY recorded_at"), []),
        }
    }

    fn append(&self, event: &AttendanceEvent, expected: &Precondition) -> Result<(), LedgerError> {
        let day = day_key(event.date());
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(map_sqlite)?;

        let (found, last): (i64, Option<String>) = tx
            .query_row(
                "SELECT COUNT(*),
                        (SELECT action FROM attendance_events
                          WHERE identity_id = ?1 AND day = ?2
                          ORDER BY seq DESC LIMIT 1)
                   FROM attendance_events
                  WHERE identity_id = ?1 AND day = ?2",
                params![event.identity_id, day],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(map_sqlite)?;

        let found = usize::try_from(found).unwrap_or(usize::MAX);
        let last_action = last.as_deref().and_then(|a| a.parse::<Action>().ok());
        let conflict = || LedgerError::PreconditionFailed {
            identity_id: event.identity_id.clone(),
            expected: expected.prior_count,
            found,
        };
        if found != expected.prior_count || last_action != expected.last_action {
            // Dropping `tx` rolls back.
            return Err(conflict());
        }

        let inserted = tx.execute(
            "INSERT INTO attendance_events
               (event_id, identity_id, day, seq, action, recorded_at, confidence, terminal_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                uuid::Uuid::new_v4().to_string(),
                event.identity_id,
                day,
                expected.prior_count as i64,
                event.action.as_str(),
                event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                event.confidence.map(f64::from),
                event.terminal_id,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                return Err(conflict());
            }
            Err(e) => return Err(map_sqlite(e)),
        }

        tx.commit().map_err(map_sqlite)?;
        tracing::debug!(
            identity = %event.identity_id,
            day = %day,
            seq = expected.prior_count,
            action = %event.action,
            "event appended"
        );
        Ok(())
    }
}
