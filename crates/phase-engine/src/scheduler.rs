//! [`SchedulerEngine`] — raw candidate-phase decision from a world signal.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use sitelink_core::Phase;
use std::sync::Arc;

/// Answers "given the current world signal, what is the raw candidate
/// phase?" (spec §4.3). Pure: reads only its own configuration/signal, no
/// store or adapter access.
pub trait SchedulerEngine: Send + Sync {
    fn candidate_phase(&self, now: DateTime<Utc>) -> Phase;
}

/// Always `working`. The trivial scheduler for sites with no time- or
/// signal-based phase distinction.
pub struct SinglePhaseSchedulerEngine;

impl SchedulerEngine for SinglePhaseSchedulerEngine {
    fn candidate_phase(&self, _now: DateTime<Utc>) -> Phase {
        Phase::new("working")
    }
}

/// One daily working window, in site-local time. `start > end` models an
/// overnight window (e.g. 22:00–06:00).
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

/// `working` inside any configured window (evaluated in `tz`), `non_working`
/// otherwise.
pub struct TimeBasedSchedulerEngine {
    windows: Vec<TimeWindow>,
    tz: Tz,
}

impl TimeBasedSchedulerEngine {
    pub fn new(windows: Vec<TimeWindow>, tz: Tz) -> Self {
        Self { windows, tz }
    }
}

impl SchedulerEngine for TimeBasedSchedulerEngine {
    fn candidate_phase(&self, now: DateTime<Utc>) -> Phase {
        let local = now.with_timezone(&self.tz);
        let t = local.time().with_nanosecond(0).unwrap_or(local.time());
        let inside = self.windows.iter().any(|w| w.contains(t));
        Phase::new(if inside { "working" } else { "non_working" })
    }
}

/// External door/gate signal consumed by [`IronGateSchedulerEngine`].
pub trait DoorSignal: Send + Sync {
    fn is_open(&self) -> bool;
}

/// `working` while the external door signal reports open, `non_working`
/// otherwise.
pub struct IronGateSchedulerEngine {
    signal: Arc<dyn DoorSignal>,
}

impl IronGateSchedulerEngine {
    pub fn new(signal: Arc<dyn DoorSignal>) -> Self {
        Self { signal }
    }
}

impl SchedulerEngine for IronGateSchedulerEngine {
    fn candidate_phase(&self, _now: DateTime<Utc>) -> Phase {
        Phase::new(if self.signal.is_open() { "working" } else { "non_working" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn single_phase_is_always_working() {
        let s = SinglePhaseSchedulerEngine;
        assert_eq!(s.candidate_phase(Utc::now()).as_str(), "working");
    }

    #[test]
    fn time_window_inside_daytime_window() {
        let windows = vec![TimeWindow::new(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        )];
        let s = TimeBasedSchedulerEngine::new(windows, chrono_tz::UTC);
        let noon = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        assert_eq!(s.candidate_phase(noon).as_str(), "working");
        assert_eq!(s.candidate_phase(midnight).as_str(), "non_working");
    }

    #[test]
    fn time_window_handles_overnight_wraparound() {
        let windows = vec![TimeWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        )];
        let s = TimeBasedSchedulerEngine::new(windows, chrono_tz::UTC);
        let late_night = Utc.with_ymd_and_hms(2026, 1, 1, 23, 30, 0).unwrap();
        let early_morning = Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap();
        let mid_afternoon = Utc.with_ymd_and_hms(2026, 1, 1, 14, 0, 0).unwrap();
        assert_eq!(s.candidate_phase(late_night).as_str(), "working");
        assert_eq!(s.candidate_phase(early_morning).as_str(), "working");
        assert_eq!(s.candidate_phase(mid_afternoon).as_str(), "non_working");
    }

    struct FixedDoor(bool);
    impl DoorSignal for FixedDoor {
        fn is_open(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn iron_gate_follows_door_signal() {
        let s = IronGateSchedulerEngine::new(Arc::new(FixedDoor(true)));
        assert_eq!(s.candidate_phase(Utc::now()).as_str(), "working");
        let s = IronGateSchedulerEngine::new(Arc::new(FixedDoor(false)));
        assert_eq!(s.candidate_phase(Utc::now()).as_str(), "non_working");
    }
}
