//! Identifiers for in-flight device requests.
//!
//! Every command written to the device gets a [`RequestId`] so that log lines
//! for the write, the correlated reply, and a possible timeout can be tied
//! together, and so that a timed-out request can clear the pending slot only
//! if the slot still belongs to it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one device request.  Ids are unique per [`RequestCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A thread-safe, monotonically increasing source of [`RequestId`]s.
///
/// Ids start at 1.  The counter wraps from `u64::MAX` back to 0 without
/// panicking.
///
/// ```rust
/// use biometric_core::RequestCounter;
///
/// let counter = RequestCounter::new();
/// assert_eq!(counter.next().get(), 1);
/// assert_eq!(counter.next().get(), 2);
/// ```
#[derive(Debug)]
pub struct RequestCounter {
    inner: AtomicU64,
}

impl RequestCounter {
    /// Creates a counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next id.
    ///
    /// `Relaxed` ordering is enough: ids only need to be unique, they do not
    /// publish any other memory.
    pub fn next(&self) -> RequestId {
        RequestId(self.inner.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.inner.load(Ordering::Relaxed).wrapping_sub(1)
    }
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::new()
    }
}
