//! Wall-clock policy: freshness window and periodic fire alignment.

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};

/// A cached count younger than this many minutes is shown without fetching.
const FRESHNESS_MINUTES: i64 = 10;

/// Gap between periodic syncs once the first one has fired.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Minutes past each ten-minute boundary at which syncs land, so we don't
/// race the remote services' own refresh at the top of the hour.
const BOUNDARY_OFFSET_MINUTES: u32 = 1;

pub fn freshness_window() -> chrono::Duration {
    chrono::Duration::minutes(FRESHNESS_MINUTES)
}

/// Wait before the first periodic sync.
///
/// Lands one minute past the next ten-minute boundary, counted in whole
/// minutes: 10:29 waits 2 minutes, 10:30 waits 11.
pub fn first_fire_delay(now: DateTime<Utc>) -> Duration {
    let minutes = 10 - (now.minute() % 10) + BOUNDARY_OFFSET_MINUTES;
    Duration::from_secs(u64::from(minutes) * 60)
}

/// Source of wall-clock time.
///
/// Timers run on tokio's clock; this is only consulted for freshness, for
/// aligning the first fire, and for stamping `lastDateTime`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, m, s).unwrap()
    }

    #[test]
    fn first_fire_one_minute_past_next_boundary() {
        assert_eq!(first_fire_delay(at(27, 15)), Duration::from_secs(4 * 60));
        assert_eq!(first_fire_delay(at(43, 0)), Duration::from_secs(8 * 60));
    }

    #[test]
    fn first_fire_window_is_two_to_eleven_minutes() {
        assert_eq!(first_fire_delay(at(29, 59)), Duration::from_secs(2 * 60));
        assert_eq!(first_fire_delay(at(30, 0)), Duration::from_secs(11 * 60));

        for minute in 0..60 {
            let delay = first_fire_delay(at(minute, 0));
            assert!(delay >= Duration::from_secs(120) && delay <= Duration::from_secs(660));
        }
    }

    #[test]
    fn manual_clock_moves_only_when_set() {
        let clock = ManualClock::new(at(0, 0));
        assert_eq!(clock.now(), at(0, 0));
        clock.set(at(5, 0));
        assert_eq!(clock.now(), at(5, 0));
    }
}
