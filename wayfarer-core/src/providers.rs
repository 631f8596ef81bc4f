//! Provider bundle for simplified wiring.
//!
//! Resolution needs a clock and a random source, and connection monitoring
//! needs a timer. [`Providers`] carries all three so they can be handed to a
//! runtime in one piece.
//!
//! ## Usage
//!
//! ```rust
//! use wayfarer_core::Providers;
//!
//! let providers = Providers::system().expect("start timer");
//! let _now = providers.time().now();
//! providers.destroy();
//! ```

use std::sync::Arc;

use crate::{
    RandomProvider, SystemTimeProvider, ThreadRandomProvider, ThreadTimer, TimeProvider, Timer,
    TimerError,
};

/// Bundle of the time, random and timer providers of one runtime.
///
/// Cloning is cheap: every provider is reference counted.
///
/// ## Implementations
///
/// - [`Providers::system`]: wall clock, thread-local RNG, dedicated timer thread
/// - [`Providers::new`]: any combination, typically manual clocks and seeded
///   randomness in tests
#[derive(Clone)]
pub struct Providers {
    time: Arc<dyn TimeProvider>,
    random: Arc<dyn RandomProvider>,
    timer: Arc<dyn Timer>,
    thread_timer: Option<Arc<ThreadTimer>>,
}

impl Providers {
    /// Bundle explicit providers.
    pub fn new(
        time: Arc<dyn TimeProvider>,
        random: Arc<dyn RandomProvider>,
        timer: Arc<dyn Timer>,
    ) -> Self {
        Self {
            time,
            random,
            timer,
            thread_timer: None,
        }
    }

    /// Production providers: system clock, thread RNG, `wayfarer-timer` thread.
    pub fn system() -> Result<Self, TimerError> {
        let timer = Arc::new(ThreadTimer::new("wayfarer-timer")?);
        Ok(Self {
            time: Arc::new(SystemTimeProvider::new()),
            random: Arc::new(ThreadRandomProvider::new()),
            timer: Arc::clone(&timer) as Arc<dyn Timer>,
            thread_timer: Some(timer),
        })
    }

    /// Get the time provider.
    pub fn time(&self) -> &Arc<dyn TimeProvider> {
        &self.time
    }

    /// Get the random provider.
    pub fn random(&self) -> &Arc<dyn RandomProvider> {
        &self.random
    }

    /// Get the timer.
    pub fn timer(&self) -> &Arc<dyn Timer> {
        &self.timer
    }

    /// Stop the timer thread started by [`Providers::system`].
    ///
    /// Externally supplied timers are left alone; their owner destroys them.
    pub fn destroy(&self) {
        if let Some(timer) = &self.thread_timer {
            timer.destroy();
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("owns_timer_thread", &self.thread_timer.is_some())
            .finish_non_exhaustive()
    }
}
