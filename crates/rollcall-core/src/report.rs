use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::AttendanceEvent;

/// Dashboard view of the ledger as of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    /// Distinct identities with at least one event today.
    pub active_today: usize,
    pub events_today: usize,
    pub total_events: usize,
    pub last_activity: Option<NaiveDateTime>,
    /// Today's events, newest first.
    pub today: Vec<AttendanceEvent>,
}

impl DailyReport {
    pub fn build(events: Vec<AttendanceEvent>, date: NaiveDate) -> Self {
        let total_events = events.len();
        let last_activity = events.iter().map(|e| e.timestamp).max();

        let mut today: Vec<AttendanceEvent> = events.into_iter().filter(|e| e.date() == date).collect();
        today.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.action.cmp(&a.action)));

        let active_today = today
            .iter()
            .map(|e| e.identity_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        Self {
            date,
            active_today,
            events_today: today.len(),
            total_events,
            last_activity,
            today,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    fn at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    fn event(id: &str, ts: NaiveDateTime, action: Action) -> AttendanceEvent {
        AttendanceEvent {
            identity_id: id.into(),
            timestamp: ts,
            action,
            confidence: None,
            terminal_id: None,
        }
    }

    #[test]
    fn test_report_counts() {
        let events = vec![
            event("a", at(15, 9), Action::Login),
            event("a", at(16, 9), Action::Login),
            event("a", at(16, 17), Action::Logout),
            event("b", at(16, 10), Action::Login),
        ];
        let report = DailyReport::build(events, at(16, 0).date());
        assert_eq!(report.active_today, 2);
        assert_eq!(report.events_today, 3);
        assert_eq!(report.total_events, 4);
        assert_eq!(report.last_activity, Some(at(16, 17)));
        assert_eq!(report.today[0].action, Action::Logout);
    }

    #[test]
    fn test_empty_report() {
        let report = DailyReport::build(vec![], at(16, 0).date());
        assert_eq!(report.active_today, 0);
        assert_eq!(report.last_activity, None);
    }
}
