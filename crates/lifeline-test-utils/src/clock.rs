// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic clocks.
//!
//! [`ManualClock`] only moves when told to. [`InstantClock`] follows tokio's
//! clock, so under `#[tokio::test(start_paused = true)]` the escalation timer
//! and the wall clock advance together.

use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use lifeline_core::Clock;
use tokio::time::Instant;

/// A fixed reference instant used by tests: 2026-08-01 09:00 UTC.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// A clock set and advanced explicitly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock only means another test thread panicked mid-update.
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(epoch())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// Wall-clock time derived from tokio's (pausable) clock.
#[derive(Debug)]
pub struct InstantClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl InstantClock {
    /// Must be created inside a tokio runtime.
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: Instant::now(),
        }
    }
}

impl Clock for InstantClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().duration_since(self.started);
        self.base + Duration::from_std(elapsed).unwrap_or(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::default();
        assert_eq!(clock.now(), epoch());
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), epoch() + Duration::minutes(5));
        clock.set(epoch());
        assert_eq!(clock.now(), epoch());
    }

    #[tokio::test(start_paused = true)]
    async fn instant_clock_follows_paused_time() {
        let clock = InstantClock::new(epoch());
        tokio::time::advance(std::time::Duration::from_secs(90)).await;
        assert_eq!(clock.now(), epoch() + Duration::seconds(90));
    }
}
