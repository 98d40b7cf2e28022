//! Sources of the current wall-clock time.
//!
//! Every trigger reads `now` from a `TimeSource` exactly once and passes it
//! into the reconcile pass, so the rest of the crate never consults the
//! system clock directly.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::{PoisonError, RwLock};

/// Supplies the current instant and the device timezone.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The device timezone, used for locations saved without one.
    fn timezone(&self) -> Tz;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    timezone: Tz,
}

impl SystemTimeSource {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }
}

/// A clock that only moves when told to. Drives the shell's simulated day and tests.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: RwLock<DateTime<Utc>>,
    timezone: Tz,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            now: RwLock::new(start),
            timezone,
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    /// Moves the clock forward and returns the new instant.
    pub fn advance(&self, by: chrono::Duration) -> DateTime<Utc> {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
        *now
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }
}
