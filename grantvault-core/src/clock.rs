//! Clock abstraction
//!
//! Expiry arithmetic always goes through a [`Clock`] so tests can pin and
//! advance time instead of sleeping.

use crate::Timestamp;
use chrono::Utc;
use std::fmt::Debug;
use std::sync::RwLock;
use std::time::Duration;

/// Source of the current instant.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Clock frozen at the current wall time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn set(&self, instant: Timestamp) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = instant;
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Time left until `instant`, clamped to zero once it has passed.
pub fn remaining(clock: &dyn Clock, instant: Timestamp) -> Duration {
    instant
        .signed_duration_since(clock.now())
        .to_std()
        .unwrap_or(Duration::ZERO)
}
