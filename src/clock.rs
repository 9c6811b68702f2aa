//! Wall clock driven by tokio's monotonic time.
//!
//! Rate-limit resets arrive as wall-clock instants, while sleeping happens on
//! tokio's timer. Anchoring one to the other keeps both consistent, and lets
//! paused-time tests move the wall clock with `tokio::time::advance`.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Anchor at the current system time.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchor at an arbitrary wall time. Used by tests.
    #[must_use]
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            mono: Instant::now(),
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.mono.elapsed()).unwrap_or_else(|_| TimeDelta::zero());
        self.wall + elapsed
    }

    /// Sleep until the wall clock reaches `at`. Returns at once for past instants.
    pub async fn sleep_until(&self, at: DateTime<Utc>) {
        let remaining = (at - self.now()).to_std().unwrap_or_default();
        if !remaining.is_zero() {
            tokio::time::sleep_until(Instant::now() + remaining).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_now_follows_paused_time() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let clock = Clock::starting_at(start);

        tokio::time::advance(Duration::from_secs(90)).await;

        assert_eq!(clock.now(), start + TimeDelta::seconds(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_reaches_target() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let clock = Clock::starting_at(start);
        let target = start + TimeDelta::seconds(60);

        clock.sleep_until(target).await;

        assert!(clock.now() >= target);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_past_returns_immediately() {
        let clock = Clock::new();
        let before = Instant::now();
        clock.sleep_until(clock.now() - TimeDelta::seconds(5)).await;
        assert_eq!(Instant::now(), before);
    }
}
