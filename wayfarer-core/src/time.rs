//! Time provider abstraction for real and manually driven clocks.
//!
//! Locator cache expiry and connection monitoring both need "now". Going
//! through a provider lets tests advance time explicitly instead of sleeping.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Provider trait for reading the current time.
///
/// ## Time Semantics
///
/// `now()` is monotonic: consecutive calls never go backwards. It is used for
/// cache entry ages and as the `now` argument passed to connection monitors.
pub trait TimeProvider: Send + Sync {
    /// Get the current monotonic time.
    fn now(&self) -> Instant;
}

/// Real time provider backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl SystemTimeProvider {
    /// Create a new system time provider.
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can hand one clone to
/// the code under test and keep another to advance time.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use wayfarer_core::{ManualTimeProvider, TimeProvider};
///
/// let clock = ManualTimeProvider::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now() - start, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualTimeProvider {
    current: Arc<Mutex<Instant>>,
}

impl ManualTimeProvider {
    /// Create a manual clock starting at the real current instant.
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += duration;
    }
}

impl Default for ManualTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
