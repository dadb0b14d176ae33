use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ledger::Precondition;

/// Raw image bytes from one camera capture.
///
/// Consumed once by the engine and never persisted.
#[derive(Clone)]
pub struct Capture {
    bytes: Vec<u8>,
}

impl Capture {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Image payloads are large and biometric; never dump them into logs.
impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture").field("len", &self.bytes.len()).finish()
    }
}

/// Quality attributes of the primary detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceQuality {
    /// Mask or other covering detected over the face.
    pub occluded: bool,
    /// Sharpness on the face service's 0–100 scale.
    pub sharpness: f32,
}

/// One candidate returned by the remote match capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    /// Identity label assigned at enrollment time.
    pub external_id: String,
    /// Similarity on the face service's 0–100 scale.
    pub similarity: f32,
}

/// Interpreted match for a capture.
///
/// `identity_id` is `None` whenever the best candidate fell below the
/// threshold; there is no low-confidence candidate state.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity_id: Option<String>,
    /// Similarity of the best candidate, 0.0 when the service returned none.
    pub confidence: f32,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            identity_id: None,
            confidence: 0.0,
        }
    }
}

/// Attendance action. `Login` orders before `Logout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Login,
    Logout,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Logout => "logout",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "login" | "in" => Ok(Action::Login),
            "logout" | "out" => Ok(Action::Logout),
            other => Err(format!("unknown action: {other:?}")),
        }
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub identity_id: String,
    /// Local wall-clock time, whole seconds.
    pub timestamp: NaiveDateTime,
    pub action: Action,
    pub confidence: Option<f32>,
    /// Terminal that wrote the event, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<String>,
}

impl AttendanceEvent {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// One identity's events for a single calendar date, oldest first.
///
/// Built fresh for every resolution cycle; never cached.
#[derive(Debug, Clone)]
pub struct DailyHistory {
    identity_id: String,
    date: NaiveDate,
    events: Vec<AttendanceEvent>,
}

impl DailyHistory {
    /// Keep only `identity_id`'s events dated `date`, re-sorted by timestamp.
    ///
    /// Stores do not guarantee order. Ties on the same second fall back to
    /// action order, since a login always precedes its logout.
    pub fn for_date(
        identity_id: &str,
        date: NaiveDate,
        events: impl IntoIterator<Item = AttendanceEvent>,
    ) -> Self {
        let mut events: Vec<AttendanceEvent> = events
            .into_iter()
            .filter(|e| e.identity_id == identity_id && e.date() == date)
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.action.cmp(&b.action)));

        Self {
            identity_id: identity_id.to_string(),
            date,
            events,
        }
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn events(&self) -> &[AttendanceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last_action(&self) -> Option<Action> {
        self.events.last().map(|e| e.action)
    }

    /// True when events strictly alternate login, logout, … starting with login.
    pub fn is_well_formed(&self) -> bool {
        self.events.iter().enumerate().all(|(i, e)| {
            let expected = if i % 2 == 0 { Action::Login } else { Action::Logout };
            e.action == expected
        })
    }

    /// The ledger state this history was read at, for a conditional append.
    pub fn precondition(&self) -> Precondition {
        Precondition {
            prior_count: self.events.len(),
            last_action: self.last_action(),
        }
    }
}
