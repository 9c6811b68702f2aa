//! Shared rate gate.
//!
//! Every adapter call waits here first. The gate keeps the most pessimistic
//! quota reading of the current window; when the remaining budget drops
//! below the threshold, every caller sleeps until the window resets.
//!
//! A batch binds its abort token with [`RateGate::interrupt_on`]; once it
//! fires, waiting callers wake up and no further call is let through.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::remote::RateLimitInfo;

#[derive(Debug)]
pub struct RateGate {
    threshold: AtomicU32,
    reading: Mutex<Option<RateLimitInfo>>,
    interrupt: Mutex<CancellationToken>,
    clock: Clock,
}

impl RateGate {
    #[must_use]
    pub fn new(threshold: u32, clock: Clock) -> Self {
        Self {
            threshold: AtomicU32::new(threshold),
            reading: Mutex::new(None),
            interrupt: Mutex::new(CancellationToken::new()),
            clock,
        }
    }

    pub fn set_threshold(&self, threshold: u32) {
        self.threshold.store(threshold, Ordering::Relaxed);
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Replace the token that interrupts waits. One batch at a time.
    pub fn interrupt_on(&self, token: CancellationToken) {
        *self.interrupt.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Drop a bound batch token so later calls are not refused.
    pub fn clear_interrupt(&self) {
        self.interrupt_on(CancellationToken::new());
    }

    fn interrupt(&self) -> CancellationToken {
        self.interrupt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current reading, if any response carried one.
    #[must_use]
    pub fn snapshot(&self) -> Option<RateLimitInfo> {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold in a reading from the adapter.
    ///
    /// A later window replaces the stored reading. Within the same window the
    /// lower `remaining` wins, since concurrent responses arrive out of order.
    /// Readings for an older window are dropped.
    pub fn observe(&self, reading: Option<RateLimitInfo>) {
        let Some(new) = reading else {
            return;
        };
        let mut current = self.reading.lock().unwrap_or_else(PoisonError::into_inner);
        *current = Some(match *current {
            None => new,
            Some(old) if new.reset_at > old.reset_at => new,
            Some(old) if new.reset_at == old.reset_at => RateLimitInfo {
                remaining: old.remaining.min(new.remaining),
                limit: new.limit.or(old.limit),
                reset_at: old.reset_at,
            },
            Some(old) => old,
        });
    }

    /// Record a refusal from the remote. Without a reset instant there is
    /// nothing to wait for, and retry backoff takes over.
    pub fn observe_exhausted(&self, reset_at: Option<DateTime<Utc>>) {
        let Some(reset_at) = reset_at else {
            return;
        };
        let limit = self.snapshot().and_then(|r| r.limit);
        self.observe(Some(RateLimitInfo {
            remaining: 0,
            limit,
            reset_at,
        }));
    }

    /// Instant callers must wait for, if the budget is too low right now.
    #[must_use]
    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        let reading = self.snapshot()?;
        let low = reading.remaining == 0 || reading.remaining < self.threshold();
        (low && reading.reset_at > self.clock.now()).then_some(reading.reset_at)
    }

    /// Suspend until the gate is open.
    ///
    /// Returns `false` without waiting out the window once the interrupt
    /// token fires.
    pub async fn wait_ready(&self) -> bool {
        let interrupt = self.interrupt();
        loop {
            if interrupt.is_cancelled() {
                return false;
            }
            let Some(until) = self.blocked_until() else {
                return true;
            };
            let remaining = self.snapshot().map_or(0, |r| r.remaining);
            warn!(
                remaining,
                threshold = self.threshold(),
                reset_at = %until,
                "Rate limit low, suspending until reset"
            );
            tokio::select! {
                () = interrupt.cancelled() => {
                    debug!("Rate limit wait interrupted");
                    return false;
                }
                () = self.clock.sleep_until(until) => debug!("Rate gate reopened"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn reading(remaining: u32, reset_secs: i64) -> Option<RateLimitInfo> {
        Some(RateLimitInfo {
            remaining,
            limit: Some(100),
            reset_at: t0() + TimeDelta::seconds(reset_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_most_pessimistic_reading_in_window() {
        let gate = RateGate::new(10, Clock::starting_at(t0()));
        gate.observe(reading(50, 60));
        gate.observe(reading(70, 60));
        assert_eq!(gate.snapshot().unwrap().remaining, 50);

        // Older window is stale.
        gate.observe(reading(3, 30));
        assert_eq!(gate.snapshot().unwrap().remaining, 50);

        // New window replaces.
        gate.observe(reading(99, 120));
        assert_eq!(gate.snapshot().unwrap().remaining, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_below_threshold_until_reset() {
        let clock = Clock::starting_at(t0());
        let gate = RateGate::new(10, clock);
        gate.observe(reading(11, 60));
        assert!(gate.blocked_until().is_none());

        gate.observe(reading(9, 60));
        assert_eq!(gate.blocked_until(), Some(t0() + TimeDelta::seconds(60)));

        assert!(gate.wait_ready().await);
        assert!(clock.now() >= t0() + TimeDelta::seconds(60));
        assert!(gate.blocked_until().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_blocks_even_with_zero_threshold() {
        let gate = RateGate::new(0, Clock::starting_at(t0()));
        gate.observe_exhausted(Some(t0() + TimeDelta::seconds(5)));
        assert!(gate.blocked_until().is_some());

        let open = RateGate::new(0, Clock::starting_at(t0()));
        open.observe_exhausted(None);
        assert!(open.snapshot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cuts_wait_short() {
        let clock = Clock::starting_at(t0());
        let gate = RateGate::new(10, clock);
        gate.observe(reading(0, 3_600));
        let token = CancellationToken::new();
        gate.interrupt_on(token.clone());

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            trigger.cancel();
        });

        assert!(!gate.wait_ready().await);
        assert!(clock.now() < t0() + TimeDelta::seconds(10));

        // Stays shut until the batch token is dropped.
        gate.observe(reading(500, 7_200));
        assert!(!gate.wait_ready().await);
        gate.clear_interrupt();
        assert!(gate.wait_ready().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_reset_does_not_block() {
        let gate = RateGate::new(10, Clock::starting_at(t0()));
        gate.observe(reading(0, -1));
        assert!(gate.blocked_until().is_none());
    }
}
