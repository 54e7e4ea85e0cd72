use bounty_types::MonoTime;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic time for every deadline the engine evaluates.
pub trait Clock: Send + Sync {
    fn now(&self) -> MonoTime;
}

/// Milliseconds since the clock was created, from `std::time::Instant`
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> MonoTime {
        let millis = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        MonoTime::from_millis(millis)
    }
}

/// Hand-driven clock for tests and simulation. Never moves backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(at: MonoTime) -> Self {
        Self {
            millis: AtomicU64::new(at.as_millis()),
        }
    }

    pub fn advance(&self, by: Duration) -> MonoTime {
        let step = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let previous = self
            .millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |m| Some(m.saturating_add(step)))
            .unwrap_or_else(|m| m);
        MonoTime::from_millis(previous.saturating_add(step))
    }

    /// Moves to `at` if it is later than the current reading
    pub fn set(&self, at: MonoTime) {
        self.millis.fetch_max(at.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> MonoTime {
        MonoTime::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// One instant seen on both this process's monotonic clock and the wall
/// clock. Monotonic readings do not survive a restart, so records rebuilt
/// from the ledger are placed on the new timeline through their wall-clock
/// timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineAnchor {
    mono: MonoTime,
    wall: DateTime<Utc>,
}

impl TimelineAnchor {
    pub fn new(mono: MonoTime, wall: DateTime<Utc>) -> Self {
        Self { mono, wall }
    }

    pub fn capture(clock: &dyn Clock) -> Self {
        Self::new(clock.now(), Utc::now())
    }

    pub fn mono(&self) -> MonoTime {
        self.mono
    }

    /// Monotonic reading corresponding to `at`. Instants before the start
    /// of this timeline map to zero.
    pub fn mono_at(&self, at: DateTime<Utc>) -> MonoTime {
        match (at - self.wall).to_std() {
            Ok(ahead) => self.mono.saturating_add(ahead),
            Err(_) => {
                let behind = (self.wall - at).to_std().unwrap_or_default();
                let behind = u64::try_from(behind.as_millis()).unwrap_or(u64::MAX);
                MonoTime::from_millis(self.mono.as_millis().saturating_sub(behind))
            }
        }
    }
}
