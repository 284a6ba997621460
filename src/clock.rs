//! Bounded-wait type used by every blocking call.
//!
//! Acquire/release on buses and ports, and the executor's control
//! synchronization, take a [`Wait`] instead of a raw tick count. Only the OS
//! layer ([`crate::oal::Oal::ms_to_ticks`]) deals in scheduler ticks.

use std::fmt;
use std::time::{Duration, Instant};

/// How long a blocking call may wait.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Wait {
    /// Do not block; fail immediately if the call cannot complete.
    NoWait,
    /// Block for at most the given duration.
    For(Duration),
    /// Block until the call completes or the bus is aborted.
    #[default]
    Forever,
}

impl Wait {
    /// Create a bounded wait from milliseconds. Zero means [`Wait::NoWait`].
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Wait::NoWait
        } else {
            Wait::For(Duration::from_millis(ms))
        }
    }

    /// Whether this wait never expires.
    #[inline]
    pub const fn is_forever(self) -> bool {
        matches!(self, Wait::Forever)
    }

    /// Absolute deadline for this wait, starting now.
    ///
    /// `None` means no deadline (wait forever). `NoWait` yields a deadline
    /// that has already passed. A duration too large to represent as an
    /// instant is treated as forever.
    pub fn deadline(self) -> Option<Instant> {
        match self {
            Wait::NoWait => Some(Instant::now()),
            Wait::For(d) => Instant::now().checked_add(d),
            Wait::Forever => None,
        }
    }

    /// The wait as a duration, if bounded.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Wait::NoWait => Some(Duration::ZERO),
            Wait::For(d) => Some(d),
            Wait::Forever => None,
        }
    }
}

impl From<Duration> for Wait {
    fn from(d: Duration) -> Self {
        if d.is_zero() { Wait::NoWait } else { Wait::For(d) }
    }
}

impl fmt::Display for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wait::NoWait => write!(f, "no-wait"),
            Wait::For(d) => write!(f, "{}ms", d.as_millis()),
            Wait::Forever => write!(f, "forever"),
        }
    }
}

/// Time remaining until `deadline`, or `None` if it has passed.
pub(crate) fn remaining(deadline: Instant) -> Option<Duration> {
    let now = Instant::now();
    if now >= deadline {
        None
    } else {
        Some(deadline - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_millis() {
        assert_eq!(Wait::from_millis(0), Wait::NoWait);
        assert_eq!(Wait::from_millis(20), Wait::For(Duration::from_millis(20)));
    }

    #[test]
    fn test_deadline() {
        assert!(Wait::Forever.deadline().is_none());
        let d = Wait::NoWait.deadline().unwrap();
        assert!(remaining(d).is_none());
        let d = Wait::from_millis(10_000).deadline().unwrap();
        assert!(remaining(d).is_some());
    }

    #[test]
    fn test_huge_wait_has_no_deadline() {
        assert!(Wait::For(Duration::MAX).deadline().is_none());
        assert!(Wait::from(Duration::MAX).deadline().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Wait::Forever.to_string(), "forever");
        assert_eq!(Wait::from_millis(250).to_string(), "250ms");
    }
}
