//! Append-only attendance ledger.

use chrono::NaiveDate;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::types::{Action, AttendanceEvent};

/// Expected state of an identity's day at append time.
///
/// An append only succeeds if the stored day still has exactly
/// `prior_count` events ending in `last_action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precondition {
    pub prior_count: usize,
    pub last_action: Option<Action>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// A concurrent writer changed the day between read and append.
    #[error("ledger precondition failed for {identity_id}: expected {expected} prior events, found {found}")]
    PreconditionFailed {
        identity_id: String,
        expected: usize,
        found: usize,
    },
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt ledger record: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

pub trait Ledger: Send {
    /// `identity_id`'s events, optionally restricted to one date.
    /// No ordering guarantee.
    fn history(
        &self,
        identity_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceEvent>, LedgerError>;

    /// Every identity's events, optionally restricted to one date.
    fn scan(&self, date: Option<NaiveDate>) -> Result<Vec<AttendanceEvent>, LedgerError>;

    /// Append `event` if the event's day still matches `expected`.
    fn append(&self, event: &AttendanceEvent, expected: &Precondition) -> Result<(), LedgerError>;
}

/// In-process ledger. Clones share storage, so two engines built on
/// clones of one `MemoryLedger` behave like two terminals on one store.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    events: Arc<Mutex<Vec<AttendanceEvent>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed events directly, bypassing the precondition.
    pub fn with_events(events: Vec<AttendanceEvent>) -> Self {
        Self {
            events: Arc::new(Mutex::new(events)),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<AttendanceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AttendanceEvent>>, LedgerError> {
        self.events
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))
    }
}

impl Ledger for MemoryLedger {
    fn history(
        &self,
        identity_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceEvent>, LedgerError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|e| e.identity_id == identity_id && date.map_or(true, |d| e.date() == d))
            .cloned()
            .collect())
    }

    fn scan(&self, date: Option<NaiveDate>) -> Result<Vec<AttendanceEvent>, LedgerError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|e| date.map_or(true, |d| e.date() == d))
            .cloned()
            .collect())
    }

    fn append(&self, event: &AttendanceEvent, expected: &Precondition) -> Result<(), LedgerError> {
        let mut events = self.lock()?;
        let mut day: Vec<&AttendanceEvent> = events
            .iter()
            .filter(|e| e.identity_id == event.identity_id && e.date() == event.date())
            .collect();
        day.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.action.cmp(&b.action)));

        let found = day.len();
        let last_action = day.last().map(|e| e.action);
        if found != expected.prior_count || last_action != expected.last_action {
            return Err(LedgerError::PreconditionFailed {
                identity_id: event.identity_id.clone(),
                expected: expected.prior_count,
                found,
            });
        }

        events.push(event.clone());
        Ok(())
    }
}
