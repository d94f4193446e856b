//! ---
//! aso_section: "01-core-functionality"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Shared primitives and utilities for the observatory runtime."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

/// Wall-clock source that never runs backwards.
///
/// Readings are millisecond precision. When the system clock steps back the
/// last issued reading is repeated until wall time catches up again.
#[derive(Debug)]
pub struct MonotonicClock {
    last_ms: AtomicI64,
}

impl MonotonicClock {
    pub const fn new() -> Self {
        Self {
            last_ms: AtomicI64::new(i64::MIN),
        }
    }

    /// Current time in milliseconds since the Unix epoch.
    pub fn now_millis(&self) -> i64 {
        self.observe(Utc::now().timestamp_millis())
    }

    pub fn now(&self) -> DateTime<Utc> {
        millis_to_datetime(self.now_millis())
    }

    fn observe(&self, wall_ms: i64) -> i64 {
        let previous = self.last_ms.fetch_max(wall_ms, Ordering::AcqRel);
        previous.max(wall_ms)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert epoch milliseconds into a UTC timestamp, saturating at the epoch on overflow.
pub fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_never_decrease() {
        let clock = MonotonicClock::new();
        assert_eq!(clock.observe(1_000), 1_000);
        assert_eq!(clock.observe(900), 1_000);
        assert_eq!(clock.observe(1_200), 1_200);
    }

    #[test]
    fn now_tracks_wall_clock() {
        let clock = MonotonicClock::new();
        let before = Utc::now().timestamp_millis();
        let reading = clock.now_millis();
        assert!(reading >= before);
        assert_eq!(millis_to_datetime(reading).timestamp_millis(), reading);
    }
}
