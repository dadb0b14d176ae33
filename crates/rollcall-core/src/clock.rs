use chrono::{Local, NaiveDateTime, Timelike};
use std::sync::{Arc, Mutex};

/// Source of "now" for the engine. Injected so resolution never reads
/// ambient time.
pub trait Clock: Send {
    /// Local wall-clock time truncated to whole seconds.
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_second(Local::now().naive_local())
    }
}

/// Clock pinned to a settable instant. Clones share the same instant.
#[derive(Clone)]
pub struct FixedClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(truncate_to_second(now))),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = truncate_to_second(now);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_fixed_clock_truncates_and_shares() {
        let ts = NaiveDate::from_ymd_opt(2026, 10, 16)
            .and_then(|d| d.and_hms_milli_opt(9, 0, 0, 750))
            .unwrap();
        let clock = FixedClock::new(ts);
        let other = clock.clone();
        assert_eq!(clock.now().nanosecond(), 0);

        let later = ts + chrono::Duration::hours(8);
        other.set(later);
        assert_eq!(clock.now().hour(), 17);
    }

    #[test]
    fn test_system_clock_whole_seconds() {
        assert_eq!(SystemClock.now().nanosecond(), 0);
    }
}
