//! rollcall-core: Attendance resolution engine.
//!
//! Turns a single camera capture into at most one attendance event:
//! quality gate, identity match against a remote face collection,
//! daily login/logout inference, then a conditional ledger append.
//! Every external capability is a trait so the engine can run against
//! the SQLite/HTTP adapters or the in-memory fakes.

pub mod clock;
pub mod enroll;
pub mod ledger;
pub mod matcher;
pub mod outcome;
pub mod profile;
pub mod quality;
pub mod report;
pub mod resolution;
pub mod session;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ledger::{Ledger, LedgerError, MemoryLedger, Precondition};
pub use matcher::{FaceService, IdentityMatcher, ServiceError};
pub use outcome::{ErrorClass, Outcome, RejectReason};
pub use profile::{MemoryProfiles, Profile, ProfileDirectory, ProfileError};
pub use quality::{QualityGate, QualityVerdict};
pub use resolution::{AttendanceEngine, EngineSettings};
pub use session::{Decision, Mode, SessionState};
pub use types::{Action, AttendanceEvent, Capture, DailyHistory, FaceMatch, FaceQuality, MatchResult};
