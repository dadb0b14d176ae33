//! Attendance resolution engine.
//!
//! One capture in, one [`Outcome`] out:
//! quality gate → identity match → today's history → session decision →
//! conditional ledger append. Each stage short-circuits, and only the
//! final stage writes.

use crate::clock::Clock;
use crate::enroll::{self, EnrollError, Enrollment};
use crate::ledger::{Ledger, LedgerError, Precondition};
use crate::matcher::{FaceService, IdentityMatcher, ServiceError, DEFAULT_MATCH_THRESHOLD};
use crate::outcome::{ErrorClass, Outcome, RejectReason};
use crate::profile::{self, Profile, ProfileDirectory, ProfileError};
use crate::quality::{QualityGate, QualityVerdict, DEFAULT_SHARPNESS_THRESHOLD};
use crate::report::DailyReport;
use crate::session::{self, Decision, Mode};
use crate::types::{AttendanceEvent, Capture, DailyHistory};

/// Tunable policy for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub collection_id: String,
    pub match_threshold: f32,
    pub sharpness_threshold: f32,
    /// Re-read-and-retry budget after a failed conditional append.
    pub conflict_retries: u32,
    /// Retry budget for transient face-service / ledger failures.
    pub service_retries: u32,
    pub terminal_id: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            collection_id: "attendance".into(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            sharpness_threshold: DEFAULT_SHARPNESS_THRESHOLD,
            conflict_retries: 1,
            service_retries: 0,
            terminal_id: None,
        }
    }
}

trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ServiceError {
    fn is_transient(&self) -> bool {
        ServiceError::is_transient(self)
    }
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        LedgerError::is_transient(self)
    }
}

pub struct AttendanceEngine {
    faces: Box<dyn FaceService>,
    ledger: Box<dyn Ledger>,
    profiles: Box<dyn ProfileDirectory>,
    clock: Box<dyn Clock>,
    gate: QualityGate,
    matcher: IdentityMatcher,
    settings: EngineSettings,
}

impl AttendanceEngine {
    pub fn new(
        faces: Box<dyn FaceService>,
        ledger: Box<dyn Ledger>,
        profiles: Box<dyn ProfileDirectory>,
        clock: Box<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            faces,
            ledger,
            profiles,
            clock,
            gate: QualityGate::new(settings.sharpness_threshold),
            matcher: IdentityMatcher::new(settings.collection_id.clone(), settings.match_threshold),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Resolve one capture to exactly one outcome.
    ///
    /// At most one ledger append happens per call, and none on any
    /// rejection, unknown-identity or error path.
    pub fn process(&self, capture: &Capture, mode: Mode) -> Outcome {
        let verdict = match self.with_retries("detect", || self.gate.check(&*self.faces, capture)) {
            Ok(v) => v,
            Err(err) => return self.service_failure("detect", err.into()),
        };

        let reason = match verdict {
            QualityVerdict::Pass(quality) => {
                tracing::debug!(sharpness = quality.sharpness, "quality gate passed");
                None
            }
            QualityVerdict::RejectNoFace => Some(RejectReason::NoFace),
            QualityVerdict::RejectOccluded => Some(RejectReason::Occluded),
            QualityVerdict::RejectBlurry {
                sharpness,
                threshold,
            } => Some(RejectReason::Blurry {
                sharpness,
                threshold,
            }),
        };
        if let Some(reason) = reason {
            tracing::info!(reason = %reason, "capture rejected");
            return Outcome::rejected(reason);
        }

        let matched = match self.with_retries("match", || self.matcher.identify(&*self.faces, capture)) {
            Ok(m) => m,
            Err(err) => return self.service_failure("match", err.into()),
        };
        let Some(identity_id) = matched.identity_id else {
            tracing::info!(confidence = matched.confidence, "identity unknown");
            return Outcome::IdentityUnknown;
        };
        tracing::debug!(identity = %identity_id, confidence = matched.confidence, "identity matched");

        self.record(&identity_id, matched.confidence, mode)
    }

    /// Resolve and append for a matched identity, re-reading fresh history
    /// after every failed precondition until the conflict budget runs out.
    fn record(&self, identity_id: &str, confidence: f32, mode: Mode) -> Outcome {
        let mut conflicts = 0u32;

        loop {
            let now = self.clock.now();
            let today = now.date();

            let events = match self.with_retries("history", || self.ledger.history(identity_id, Some(today))) {
                Ok(events) => events,
                Err(err) => return self.service_failure("history", err.into()),
            };
            let history = DailyHistory::for_date(identity_id, today, events);
            if !history.is_well_formed() {
                tracing::warn!(
                    identity = identity_id,
                    n = history.len(),
                    "today's history does not alternate login/logout"
                );
            }

            let action = match session::decide(&history, mode) {
                Decision::Append(action) => action,
                Decision::ShiftComplete => {
                    tracing::info!(identity = identity_id, n = history.len(), "shift already complete");
                    return Outcome::ShiftAlreadyComplete {
                        identity_id: identity_id.to_string(),
                    };
                }
                Decision::OutOfSequence { requested, expected } => {
                    tracing::info!(
                        identity = identity_id,
                        requested = %requested,
                        expected = %expected,
                        "explicit action out of sequence"
                    );
                    return Outcome::rejected(RejectReason::OutOfSequence { requested, expected });
                }
            };

            let event = AttendanceEvent {
                identity_id: identity_id.to_string(),
                timestamp: now,
                action,
                confidence: Some(confidence),
                terminal_id: self.settings.terminal_id.clone(),
            };

            match self.append_once(&event, &history.precondition()) {
                Ok(()) => {
                    let name = profile::display_name(&*self.profiles, identity_id);
                    tracing::info!(
                        identity = identity_id,
                        action = %action,
                        n = history.len(),
                        "attendance recorded"
                    );
                    return Outcome::recorded(action, identity_id.to_string(), name, now);
                }
                Err(err @ LedgerError::PreconditionFailed { .. }) => {
                    if conflicts >= self.settings.conflict_retries {
                        return self.service_failure("append", err.into());
                    }
                    conflicts += 1;
                    tracing::warn!(
                        identity = identity_id,
                        attempt = conflicts,
                        error = %err,
                        "concurrent append detected; re-resolving"
                    );
                }
                Err(err) => return self.service_failure("append", err.into()),
            }
        }
    }

    /// Append `event` under `expected`, retrying transient failures with the
    /// same event and precondition.
    ///
    /// A failed attempt may still have committed. When a retry then finds the
    /// precondition stale, today's history is re-read: if `event` is in it the
    /// append counts as done, otherwise the conflict is returned unchanged.
    fn append_once(&self, event: &AttendanceEvent, expected: &Precondition) -> Result<(), LedgerError> {
        let mut attempt = 0u32;
        loop {
            match self.ledger.append(event, expected) {
                Err(err) if err.is_transient() && attempt < self.settings.service_retries => {
                    attempt += 1;
                    tracing::warn!(
                        identity = %event.identity_id,
                        attempt,
                        error = %err,
                        "append failed; retrying"
                    );
                }
                Err(err @ LedgerError::PreconditionFailed { .. }) if attempt > 0 => {
                    let events = self.ledger.history(&event.identity_id, Some(event.date()))?;
                    let landed = events.iter().any(|e| is_same_event(e, event));
                    if landed {
                        tracing::info!(
                            identity = %event.identity_id,
                            action = %event.action,
                            "earlier append attempt had committed"
                        );
                        return Ok(());
                    }
                    return Err(err);
                }
                result => return result,
            }
        }
    }

    fn with_retries<T, E: Transient + std::fmt::Display>(
        &self,
        stage: &'static str,
        mut op: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempt < self.settings.service_retries => {
                    attempt += 1;
                    tracing::warn!(stage, attempt, error = %err, "transient failure; retrying");
                }
                result => return result,
            }
        }
    }

    fn service_failure(&self, stage: &'static str, outcome: Outcome) -> Outcome {
        if let Outcome::ServiceError { detail, class } = &outcome {
            if *class == ErrorClass::StateConflict {
                tracing::warn!(stage, detail = %detail, "conflict retries exhausted");
            } else {
                tracing::warn!(stage, class = ?class, detail = %detail, "service error");
            }
        }
        outcome
    }

    /// Link a face to a registered identity.
    pub fn enroll(&self, identity_id: &str, capture: &Capture) -> Result<Enrollment, EnrollError> {
        enroll::enroll(
            &*self.faces,
            &*self.profiles,
            &self.gate,
            &self.settings.collection_id,
            identity_id,
            capture,
        )
    }

    pub fn register_profile(&self, profile: &Profile) -> Result<(), ProfileError> {
        self.profiles.upsert(profile)?;
        tracing::info!(identity = %profile.identity_id, "profile registered");
        Ok(())
    }

    /// Today's dashboard figures, computed from a full ledger scan.
    pub fn daily_report(&self) -> Result<DailyReport, LedgerError> {
        let today = self.clock.now().date();
        let events = self.ledger.scan(None)?;
        Ok(DailyReport::build(events, today))
    }

    /// Every event for `identity_id`, newest first.
    pub fn identity_history(&self, identity_id: &str) -> Result<Vec<AttendanceEvent>, LedgerError> {
        let mut events = self.ledger.history(identity_id, None)?;
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.action.cmp(&a.action)));
        Ok(events)
    }
}

fn is_same_event(a: &AttendanceEvent, b: &AttendanceEvent) -> bool {
    a.identity_id == b.identity_id
        && a.timestamp == b.timestamp
        && a.action == b.action
        && a.terminal_id == b.terminal_id
}
