use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Weekly leaderboard boundary: Monday 00:00 at a fixed reference offset.
/// Every profile is aligned to the same grid, so resets are global.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekBoundary {
    pub utc_offset_minutes: i32,
}

impl WeekBoundary {
    pub fn new(utc_offset_minutes: i32) -> Self {
        Self { utc_offset_minutes }
    }

    /// The first boundary strictly after `instant`.
    pub fn next_after(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::minutes(self.utc_offset_minutes as i64);
        let local = instant.naive_utc() + offset;
        let days_since_monday = local.weekday().num_days_from_monday() as i64;
        let monday = local.date() - Duration::days(days_since_monday);
        let next_monday = (monday + Duration::days(7)).and_time(NaiveTime::MIN);
        Utc.from_utc_datetime(&(next_monday - offset))
    }

    /// Advances a reset instant by whole weeks until it lies after `now`.
    /// One week in the normal case; more if sweeps were missed.
    pub fn roll_forward(&self, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut next = reset_at + Duration::weeks(1);
        while next <= now {
            next += Duration::weeks(1);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    #[test]
    fn next_boundary_is_the_following_monday_midnight() {
        let week = WeekBoundary::default();
        // 2026-10-14 is a Wednesday.
        let next = week.next_after(at(2026, 10, 14, 15, 30));
        assert_eq!(next, at(2026, 10, 19, 0, 0));
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn a_boundary_instant_maps_to_the_next_week() {
        let week = WeekBoundary::default();
        assert_eq!(week.next_after(at(2026, 10, 19, 0, 0)), at(2026, 10, 26, 0, 0));
    }

    #[test]
    fn reference_offset_shifts_the_boundary() {
        // UTC-8: Monday 00:00 local is Monday 08:00 UTC.
        let week = WeekBoundary::new(-8 * 60);
        assert_eq!(week.next_after(at(2026, 10, 19, 7, 0)), at(2026, 10, 19, 8, 0));
        assert_eq!(week.next_after(at(2026, 10, 19, 8, 0)), at(2026, 10, 26, 8, 0));
    }

    #[test]
    fn roll_forward_skips_missed_weeks() {
        let week = WeekBoundary::default();
        let reset = at(2026, 10, 5, 0, 0);
        assert_eq!(week.roll_forward(reset, at(2026, 10, 6, 0, 0)), at(2026, 10, 12, 0, 0));
        assert_eq!(week.roll_forward(reset, at(2026, 10, 20, 0, 0)), at(2026, 10, 26, 0, 0));
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(at(2026, 1, 1, 0, 0));
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), at(2026, 1, 1, 2, 0));
    }
}
