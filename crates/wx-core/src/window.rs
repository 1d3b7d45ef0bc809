//! Detection window: the monotone state machine `ScheduleManager` drives
//! per `(model, cycleHour, runDate)` while waiting for a model run to be
//! published and confirmed (SPEC_FULL §3, §4.1, §4.2).
//!
//! Modeled after the `ReadyPhase` monotone-advance idiom used for websocket
//! subscription readiness in the teacher's connection layer: transitions
//! only ever move forward, and a window that misses its deadline is marked
//! terminal rather than silently reset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The detection window's lifecycle. Transitions are monotone in the order
/// listed; `Missed` is terminal and reachable from any non-`Confirmed`
/// state once the window's deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Pending,
    Detecting,
    Detected,
    Confirmed,
    Missed,
}

impl WindowStatus {
    /// Ordinal position in the monotone sequence; `Missed` is exempted
    /// since it can be entered from anywhere.
    fn rank(self) -> u8 {
        match self {
            WindowStatus::Pending => 0,
            WindowStatus::Detecting => 1,
            WindowStatus::Detected => 2,
            WindowStatus::Confirmed => 3,
            WindowStatus::Missed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WindowStatus::Confirmed | WindowStatus::Missed)
    }
}

/// The polling window for one model run, tracked by `ScheduleManager` and
/// advanced by `ObjectStoreDetector` as detection progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionWindow {
    pub model: String,
    pub cycle_hour: u8,
    pub run_date: chrono::NaiveDate,
    pub window_start: DateTime<Utc>,
    pub expected_publish_time: DateTime<Utc>,
    pub max_duration: Duration,
    pub status: WindowStatus,
}

impl DetectionWindow {
    pub fn new(
        model: impl Into<String>,
        cycle_hour: u8,
        run_date: chrono::NaiveDate,
        expected_publish_time: DateTime<Utc>,
        buffer: Duration,
        max_duration: Duration,
    ) -> Self {
        Self {
            model: model.into(),
            cycle_hour,
            run_date,
            window_start: expected_publish_time - buffer,
            expected_publish_time,
            max_duration,
            status: WindowStatus::Pending,
        }
    }

    /// Attempt to advance to `next`. A no-op if `next` would move the
    /// window backward, or if the window is already terminal; `Missed` is
    /// always accepted unless already `Confirmed`.
    pub fn advance(&mut self, next: WindowStatus) {
        if self.status == WindowStatus::Confirmed {
            return;
        }
        if next == WindowStatus::Missed || next.rank() > self.status.rank() {
            self.status = next;
        }
    }

    /// Whether, as of `now`, this window has exceeded its maximum duration
    /// without reaching `Confirmed` (SPEC_FULL §4.2's timeout rule).
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !matches!(self.status, WindowStatus::Confirmed)
            && now - self.window_start > self.max_duration
    }

    /// Mark the window `Missed` if it is overdue; returns whether a
    /// transition happened.
    pub fn check_timeout(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_overdue(now) && self.status != WindowStatus::Missed {
            self.status = WindowStatus::Missed;
            true
        } else {
            false
        }
    }

    /// Dedup/lookup key shared with `RunRecord::dedup_key`.
    pub fn key(&self) -> (String, u8, chrono::NaiveDate) {
        (self.model.clone(), self.cycle_hour, self.run_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> DetectionWindow {
        DetectionWindow::new(
            "hrrr",
            12,
            chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(),
            DateTime::UNIX_EPOCH + Duration::minutes(90),
            Duration::minutes(5),
            Duration::minutes(15),
        )
    }

    #[test]
    fn window_start_is_publish_time_minus_buffer() {
        let w = window();
        assert_eq!(w.window_start, DateTime::UNIX_EPOCH + Duration::minutes(85));
    }

    #[test]
    fn advance_is_monotone() {
        let mut w = window();
        w.advance(WindowStatus::Detected);
        assert_eq!(w.status, WindowStatus::Detected);
        // Attempting to move backward is a no-op.
        w.advance(WindowStatus::Detecting);
        assert_eq!(w.status, WindowStatus::Detected);
    }

    #[test]
    fn confirmed_is_sticky() {
        let mut w = window();
        w.advance(WindowStatus::Confirmed);
        w.advance(WindowStatus::Missed);
        assert_eq!(w.status, WindowStatus::Confirmed);
    }

    #[test]
    fn overdue_window_marked_missed() {
        let mut w = window();
        let overdue_time = w.window_start + Duration::minutes(16);
        assert!(w.check_timeout(overdue_time));
        assert_eq!(w.status, WindowStatus::Missed);
    }

    #[test]
    fn confirmed_window_never_overdue() {
        let mut w = window();
        w.advance(WindowStatus::Confirmed);
        let far_future = w.window_start + Duration::hours(10);
        assert!(!w.check_timeout(far_future));
        assert_eq!(w.status, WindowStatus::Confirmed);
    }
}
