//! Injectable time sources.
//!
//! Nothing in the reconciliation engine reads the system clock directly; entry
//! points that need "now" take a [`Clock`] and read it once per query.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Smallest time increment the engine distinguishes.
///
/// Matches the microsecond precision timestamps are persisted with.
pub const TIME_RESOLUTION: Duration = Duration::microseconds(1);

/// A source of the current instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Wraps a clock so that successive readings never move backward.
#[derive(Debug, Default)]
pub struct MonotonicClock<C> {
    inner: C,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl<C: Clock> MonotonicClock<C> {
    pub const fn new(inner: C) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }
}

impl<C: Clock> Clock for MonotonicClock<C> {
    fn now(&self) -> DateTime<Utc> {
        let reading = self.inner.now();
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = match *last {
            Some(previous) if previous > reading => {
                tracing::warn!(%previous, %reading, "clock moved backward, holding previous reading");
                previous
            }
            _ => reading,
        };
        *last = Some(now);
        now
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
