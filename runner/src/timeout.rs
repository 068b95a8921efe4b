//! Process-wide ceiling on transaction scope timeouts.
//!
//! Every scope timeout is clamped to the ceiling, which starts at
//! [`DEFAULT_MAXIMUM_TIMEOUT`]. A run raises it once at startup, before any
//! scope exists, so a long migration keeps the timeout it was configured with
//! instead of being cut short at the default.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Ceiling in force until someone raises it.
pub const DEFAULT_MAXIMUM_TIMEOUT: Duration = Duration::from_secs(10 * 60);

static PROCESS_CEILING: TimeoutCeiling = TimeoutCeiling::new(DEFAULT_MAXIMUM_TIMEOUT);

/// The ceiling shared by the whole process. Never torn down.
pub fn process_ceiling() -> &'static TimeoutCeiling {
    &PROCESS_CEILING
}

/// An upper bound applied to requested scope timeouts.
#[derive(Debug)]
pub struct TimeoutCeiling {
    max_millis: AtomicU64,
}

impl TimeoutCeiling {
    pub const fn new(maximum: Duration) -> Self {
        Self {
            max_millis: AtomicU64::new(maximum.as_millis() as u64),
        }
    }

    pub fn maximum(&self) -> Duration {
        Duration::from_millis(self.max_millis.load(Ordering::SeqCst))
    }

    /// Raise the ceiling to at least `maximum`. Never lowers it.
    fn raise_to(&self, maximum: Duration) -> Duration {
        let requested = u64::try_from(maximum.as_millis()).unwrap_or(u64::MAX);
        let previous = self.max_millis.fetch_max(requested, Ordering::SeqCst);
        Duration::from_millis(previous.max(requested))
    }

    pub fn clamp(&self, requested: Duration) -> Duration {
        requested.min(self.maximum())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CeilingError {
    #[error("the timeout ceiling cannot be changed in this process")]
    Unavailable,
}

/// Grants (or withholds) the ability to raise a [`TimeoutCeiling`].
#[derive(Debug, Clone, Copy)]
pub struct TimeoutAuthority<'a> {
    ceiling: &'a TimeoutCeiling,
    can_raise: bool,
}

impl TimeoutAuthority<'static> {
    /// Authority over the process ceiling.
    pub fn process(can_raise: bool) -> Self {
        Self::new(process_ceiling(), can_raise)
    }
}

impl<'a> TimeoutAuthority<'a> {
    pub fn new(ceiling: &'a TimeoutCeiling, can_raise: bool) -> Self {
        Self { ceiling, can_raise }
    }

    /// Raise the ceiling so scopes may last `timeout`.
    ///
    /// Returns the ceiling now in force. Callers treat an error as a warning:
    /// the run continues with the current ceiling.
    pub fn raise_maximum_timeout(&self, timeout: Duration) -> Result<Duration, CeilingError> {
        if !self.can_raise {
            return Err(CeilingError::Unavailable);
        }
        let now = self.ceiling.raise_to(timeout);
        debug!(ceiling_secs = now.as_secs(), "timeout ceiling raised");
        Ok(now)
    }

    /// Timeout a scope actually gets when `requested` is asked for.
    pub fn effective_timeout(&self, requested: Duration) -> Duration {
        let effective = self.ceiling.clamp(requested);
        if effective < requested {
            warn!(
                requested_secs = requested.as_secs(),
                ceiling_secs = effective.as_secs(),
                "scope timeout clamped to ceiling"
            );
        }
        effective
    }

    pub fn maximum(&self) -> Duration {
        self.ceiling.maximum()
    }
}
