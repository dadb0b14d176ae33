//! Daily session state machine.
//!
//! At most one login/logout pair per identity per calendar date:
//!
//! ```text
//! NotClockedIn --login--> ClockedIn --logout--> ShiftComplete
//! ```
//!
//! State is derived from the count of today's events only, so it resets
//! whenever the caller's `today` moves past midnight.

use serde::{Deserialize, Serialize};

use crate::types::{Action, DailyHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotClockedIn,
    ClockedIn,
    ShiftComplete,
}

impl SessionState {
    pub fn from_count(n: usize) -> Self {
        match n {
            0 => SessionState::NotClockedIn,
            1 => SessionState::ClockedIn,
            _ => SessionState::ShiftComplete,
        }
    }

    pub fn of(history: &DailyHistory) -> Self {
        Self::from_count(history.len())
    }

    /// The only action permitted from this state, `None` once terminal.
    pub fn next_action(self) -> Option<Action> {
        match self {
            SessionState::NotClockedIn => Some(Action::Login),
            SessionState::ClockedIn => Some(Action::Logout),
            SessionState::ShiftComplete => None,
        }
    }
}

/// How the caller wants the action chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One-step terminal: infer login or logout from today's history.
    #[default]
    AutoInfer,
    /// Two-button terminal: the user asked for a specific action.
    Explicit(Action),
}

/// What the engine should do for one resolution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Append(Action),
    ShiftComplete,
    /// Explicit request that does not match the current state.
    OutOfSequence { requested: Action, expected: Action },
}

/// Next valid action for `history`, or `None` when the shift is complete.
pub fn resolve(history: &DailyHistory) -> Option<Action> {
    SessionState::of(history).next_action()
}

/// Drive (auto) or query (explicit) the state machine for `history`.
pub fn decide(history: &DailyHistory, mode: Mode) -> Decision {
    let Some(next) = resolve(history) else {
        return Decision::ShiftComplete;
    };
    match mode {
        Mode::AutoInfer => Decision::Append(next),
        Mode::Explicit(requested) if requested == next => Decision::Append(next),
        Mode::Explicit(requested) => Decision::OutOfSequence {
            requested,
            expected: next,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttendanceEvent;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    fn history(today: u32, entries: &[(u32, u32, Action)]) -> DailyHistory {
        let events = entries.iter().map(|&(day, hour, action)| AttendanceEvent {
            identity_id: "emp1".into(),
            timestamp: at(day, hour),
            action,
            confidence: Some(95.0),
            terminal_id: None,
        });
        DailyHistory::for_date("emp1", at(today, 0).date(), events)
    }

    #[test]
    fn test_empty_history_logs_in() {
        assert_eq!(resolve(&history(16, &[])), Some(Action::Login));
    }

    #[test]
    fn test_single_event_logs_out() {
        let h = history(16, &[(16, 9, Action::Login)]);
        assert_eq!(resolve(&h), Some(Action::Logout));
    }

    #[test]
    fn test_pair_completes_shift() {
        let h = history(16, &[(16, 9, Action::Login), (16, 17, Action::Logout)]);
        assert_eq!(resolve(&h), None);
        assert_eq!(decide(&h, Mode::AutoInfer), Decision::ShiftComplete);
    }

    #[test]
    fn test_more_than_two_events_stays_complete() {
        let h = history(
            16,
            &[(16, 9, Action::Login), (16, 12, Action::Logout), (16, 13, Action::Login)],
        );
        assert_eq!(SessionState::of(&h), SessionState::ShiftComplete);
    }

    #[test]
    fn test_yesterday_is_ignored() {
        let h = history(16, &[(15, 9, Action::Login), (15, 17, Action::Logout)]);
        assert_eq!(SessionState::of(&h), SessionState::NotClockedIn);

        let h = history(16, &[(15, 9, Action::Login)]);
        assert_eq!(decide(&h, Mode::AutoInfer), Decision::Append(Action::Login));
    }

    #[test]
    fn test_explicit_matching_request_is_accepted() {
        let h = history(16, &[(16, 9, Action::Login)]);
        assert_eq!(
            decide(&h, Mode::Explicit(Action::Logout)),
            Decision::Append(Action::Logout)
        );
    }

    #[test]
    fn test_explicit_second_login_is_refused() {
        let h = history(16, &[(16, 9, Action::Login)]);
        assert_eq!(
            decide(&h, Mode::Explicit(Action::Login)),
            Decision::OutOfSequence {
                requested: Action::Login,
                expected: Action::Logout,
            }
        );
    }

    #[test]
    fn test_explicit_logout_before_login_is_refused() {
        let h = history(16, &[]);
        assert!(matches!(
            decide(&h, Mode::Explicit(Action::Logout)),
            Decision::OutOfSequence { expected: Action::Login, .. }
        ));
    }

    #[test]
    fn test_explicit_after_shift_reports_complete() {
        let h = history(16, &[(16, 9, Action::Login), (16, 17, Action::Logout)]);
        assert_eq!(decide(&h, Mode::Explicit(Action::Login)), Decision::ShiftComplete);
    }
}
