use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::LedgerError;
use crate::matcher::ServiceError;
use crate::types::Action;

/// Why a capture or request was refused before anything was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    NoFace,
    Occluded,
    Blurry { sharpness: f32, threshold: f32 },
    /// Explicit-mode request that does not match the session state.
    OutOfSequence { requested: Action, expected: Action },
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoFace => "no_face",
            RejectReason::Occluded => "occluded",
            RejectReason::Blurry { .. } => "blurry",
            RejectReason::OutOfSequence { .. } => "out_of_sequence",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy shared by every outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Recorded,
    /// Occlusion, blur, no face, out-of-sequence request. Recapture.
    InputRejected,
    /// No enrolled match. Enroll first.
    IdentityUnknown,
    /// Remote capability unreachable or throttled. Retry from scratch.
    ServiceTransient,
    /// Remote capability refused the request. Not retried.
    ServiceFault,
    /// Concurrent writer kept winning the conditional append.
    StateConflict,
    /// Shift already complete for today.
    StateTerminal,
}

/// Terminal result of one `process` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    LoginRecorded {
        identity_id: String,
        name: String,
        timestamp: NaiveDateTime,
    },
    LogoutRecorded {
        identity_id: String,
        name: String,
        timestamp: NaiveDateTime,
    },
    ShiftAlreadyComplete {
        identity_id: String,
    },
    Rejected {
        reason: RejectReason,
    },
    IdentityUnknown,
    ServiceError {
        detail: String,
        class: ErrorClass,
    },
}

impl Outcome {
    pub fn recorded(action: Action, identity_id: String, name: String, timestamp: NaiveDateTime) -> Self {
        match action {
            Action::Login => Outcome::LoginRecorded {
                identity_id,
                name,
                timestamp,
            },
            Action::Logout => Outcome::LogoutRecorded {
                identity_id,
                name,
                timestamp,
            },
        }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        Outcome::Rejected { reason }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Outcome::LoginRecorded { .. } | Outcome::LogoutRecorded { .. } => ErrorClass::Recorded,
            Outcome::ShiftAlreadyComplete { .. } => ErrorClass::StateTerminal,
            Outcome::Rejected { .. } => ErrorClass::InputRejected,
            Outcome::IdentityUnknown => ErrorClass::IdentityUnknown,
            Outcome::ServiceError { class, .. } => *class,
        }
    }

    /// Whether a caller may offer to retry the same request.
    pub fn retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::ServiceTransient | ErrorClass::StateConflict
        )
    }

    pub fn is_recorded(&self) -> bool {
        self.class() == ErrorClass::Recorded
    }

    /// One human-readable message per outcome class.
    pub fn message(&self) -> String {
        match self {
            Outcome::LoginRecorded { name, timestamp, .. } => {
                format!("Welcome, {name}. Logged in at {}.", timestamp.format("%H:%M:%S"))
            }
            Outcome::LogoutRecorded { name, timestamp, .. } => {
                format!("Goodbye, {name}. Logged out at {}.", timestamp.format("%H:%M:%S"))
            }
            Outcome::ShiftAlreadyComplete { identity_id } => {
                format!("{identity_id} has already completed today's shift.")
            }
            Outcome::Rejected { reason } => match reason {
                RejectReason::NoFace => "No face detected. Please face the camera.".into(),
                RejectReason::Occluded => {
                    "Please remove your face mask to mark attendance.".into()
                }
                RejectReason::Blurry { .. } => {
                    "Image too blurry. Please hold still and try again.".into()
                }
                RejectReason::OutOfSequence { requested, expected } => {
                    format!("Cannot {requested} now; expected {expected}.")
                }
            },
            Outcome::IdentityUnknown => "Identity not recognized. Please register first.".into(),
            Outcome::ServiceError { detail, class } => match class {
                ErrorClass::StateConflict => {
                    format!("Attendance was updated elsewhere; please try again ({detail}).")
                }
                _ => format!("Attendance service error: {detail}"),
            },
        }
    }
}

impl From<ServiceError> for Outcome {
    fn from(err: ServiceError) -> Self {
        let class = if err.is_transient() {
            ErrorClass::ServiceTransient
        } else {
            ErrorClass::ServiceFault
        };
        Outcome::ServiceError {
            detail: err.to_string(),
            class,
        }
    }
}

impl From<LedgerError> for Outcome {
    fn from(err: LedgerError) -> Self {
        let class = match &err {
            LedgerError::PreconditionFailed { .. } => ErrorClass::StateConflict,
            LedgerError::Unavailable(_) => ErrorClass::ServiceTransient,
            LedgerError::Corrupt(_) => ErrorClass::ServiceFault,
        };
        Outcome::ServiceError {
            detail: err.to_string(),
            class,
        }
    }
}
