//! Timer abstraction and a dedicated-thread implementation.
//!
//! Connection monitors register repeating tasks with a [`Timer`]. Tasks run
//! one at a time on the timer's own thread, so a task never races with
//! another task of the same timer.
//!
//! # Lock discipline
//!
//! ```text
//!  caller thread                    timer thread
//!  ─────────────                    ────────────
//!  schedule()/cancel()  ──lock──►  TimerState  ◄──lock── pick next due task
//!                                                         unlock
//!                                                         run_timer_task()
//! ```
//!
//! The timer lock is never held while a task runs. A task may therefore call
//! back into the timer (cancel itself, schedule another task) without
//! deadlocking.

use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors returned by timer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    /// The timer has been destroyed and accepts no more tasks.
    #[error("timer destroyed")]
    Destroyed,

    /// A repeating task was scheduled with a zero period.
    #[error("repeating task period must be non-zero")]
    InvalidPeriod,

    /// The timer thread could not be started.
    #[error("failed to spawn timer thread: {0}")]
    Spawn(String),
}

/// Work item executed by a [`Timer`].
pub trait TimerTask: Send + Sync {
    /// Run the task. Called on the timer thread.
    fn run_timer_task(&self);
}

/// Handle identifying one scheduled task, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    /// Token with a raw id, for [`Timer`] implementations outside this crate.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id of the token.
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Provider trait for scheduling deferred and periodic work.
pub trait Timer: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, task: Arc<dyn TimerTask>, delay: Duration)
        -> Result<TimerToken, TimerError>;

    /// Run `task` every `period`, first after one `period`.
    fn schedule_repeated(
        &self,
        task: Arc<dyn TimerTask>,
        period: Duration,
    ) -> Result<TimerToken, TimerError>;

    /// Cancel a scheduled task.
    ///
    /// Returns `true` if the task was still scheduled. A task already
    /// running is not interrupted, but a repeating task will not run again.
    fn cancel(&self, token: TimerToken) -> bool;
}

struct ScheduledTask {
    task: Arc<dyn TimerTask>,
    deadline: Instant,
    period: Option<Duration>,
}

#[derive(Default)]
struct TimerState {
    next_token: u64,
    queue: BTreeSet<(Instant, TimerToken)>,
    entries: HashMap<TimerToken, ScheduledTask>,
    destroyed: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`Timer`] running every task on one dedicated background thread.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::time::Duration;
/// use wayfarer_core::{ThreadTimer, Timer, TimerTask};
///
/// struct Flag(AtomicBool);
/// impl TimerTask for Flag {
///     fn run_timer_task(&self) {
///         self.0.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let timer = ThreadTimer::new("doc-timer").expect("spawn timer");
/// let flag = Arc::new(Flag(AtomicBool::new(false)));
/// timer.schedule(flag.clone(), Duration::ZERO).expect("schedule");
/// while !flag.0.load(Ordering::SeqCst) {
///     std::thread::sleep(Duration::from_millis(1));
/// }
/// timer.destroy();
/// ```
pub struct ThreadTimer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl ThreadTimer {
    /// Start a timer whose thread is called `name`.
    pub fn new(name: &str) -> Result<Self, TimerError> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState::default()),
            wakeup: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&worker))
            .map_err(|e| TimerError::Spawn(e.to_string()))?;

        Ok(Self {
            shared,
            thread_id: handle.thread().id(),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Whether the caller is running on this timer's thread.
    pub fn is_timer_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Stop the timer thread and drop every pending task.
    ///
    /// Waits for a task in progress to finish unless called from the timer
    /// thread itself. Idempotent.
    pub fn destroy(&self) {
        {
            let mut state = self.shared.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.queue.clear();
            state.entries.clear();
        }
        self.shared.wakeup.notify_all();

        if self.is_timer_thread() {
            return;
        }
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("timer thread terminated by panic");
            }
        }
    }

    fn insert(
        &self,
        task: Arc<dyn TimerTask>,
        delay: Duration,
        period: Option<Duration>,
    ) -> Result<TimerToken, TimerError> {
        let mut state = self.shared.lock();
        if state.destroyed {
            return Err(TimerError::Destroyed);
        }

        let token = TimerToken(state.next_token);
        state.next_token += 1;
        let deadline = Instant::now() + delay;
        state.queue.insert((deadline, token));
        state.entries.insert(
            token,
            ScheduledTask {
                task,
                deadline,
                period,
            },
        );
        drop(state);

        self.shared.wakeup.notify_all();
        Ok(token)
    }
}

impl Timer for ThreadTimer {
    fn schedule(
        &self,
        task: Arc<dyn TimerTask>,
        delay: Duration,
    ) -> Result<TimerToken, TimerError> {
        self.insert(task, delay, None)
    }

    fn schedule_repeated(
        &self,
        task: Arc<dyn TimerTask>,
        period: Duration,
    ) -> Result<TimerToken, TimerError> {
        if period.is_zero() {
            return Err(TimerError::InvalidPeriod);
        }
        self.insert(task, period, Some(period))
    }

    fn cancel(&self, token: TimerToken) -> bool {
        let mut state = self.shared.lock();
        match state.entries.remove(&token) {
            Some(entry) => {
                state.queue.remove(&(entry.deadline, token));
                true
            }
            None => false,
        }
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn run(shared: &TimerShared) {
    let mut state = shared.lock();
    loop {
        if state.destroyed {
            return;
        }

        let next = state.queue.first().copied();
        let Some((deadline, token)) = next else {
            state = shared
                .wakeup
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        };

        let now = Instant::now();
        if deadline > now {
            state = shared
                .wakeup
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }

        let pending = &mut *state;
        pending.queue.remove(&(deadline, token));
        let task = match pending.entries.get_mut(&token) {
            Some(entry) => {
                let task = Arc::clone(&entry.task);
                match entry.period {
                    Some(period) => {
                        let next = now + period;
                        entry.deadline = next;
                        pending.queue.insert((next, token));
                    }
                    None => {
                        pending.entries.remove(&token);
                    }
                }
                task
            }
            None => continue,
        };
        drop(state);

        if catch_unwind(AssertUnwindSafe(|| task.run_timer_task())).is_err() {
            tracing::error!(token = token.0, "timer task panicked");
        }

        state = shared.lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self(AtomicUsize::new(0)))
        }

        fn get(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl TimerTask for Counter {
        fn run_timer_task(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicker;

    impl TimerTask for Panicker {
        fn run_timer_task(&self) {
            panic!("task failure");
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_one_shot_task_runs_once() {
        let timer = ThreadTimer::new("test-timer").expect("timer");
        let counter = Counter::new();
        timer
            .schedule(counter.clone(), Duration::from_millis(5))
            .expect("schedule");

        assert!(wait_until(|| counter.get() == 1));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.get(), 1);
        timer.destroy();
    }

    #[test]
    fn test_repeated_task_runs_until_cancelled() {
        let timer = ThreadTimer::new("test-timer").expect("timer");
        let counter = Counter::new();
        let token = timer
            .schedule_repeated(counter.clone(), Duration::from_millis(2))
            .expect("schedule");

        assert!(wait_until(|| counter.get() >= 3));
        assert!(timer.cancel(token));
        let after_cancel = counter.get();
        thread::sleep(Duration::from_millis(30));
        // At most one run that was already in flight.
        assert!(counter.get() <= after_cancel + 1);
        assert!(!timer.cancel(token));
        timer.destroy();
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let timer = ThreadTimer::new("test-timer").expect("timer");
        let result = timer.schedule_repeated(Counter::new(), Duration::ZERO);
        assert_eq!(result, Err(TimerError::InvalidPeriod));
    }

    #[test]
    fn test_destroyed_timer_rejects_tasks() {
        let timer = ThreadTimer::new("test-timer").expect("timer");
        timer.destroy();
        timer.destroy();
        let result = timer.schedule(Counter::new(), Duration::ZERO);
        assert_eq!(result, Err(TimerError::Destroyed));
    }

    #[test]
    fn test_panicking_task_does_not_stop_timer() {
        let timer = ThreadTimer::new("test-timer").expect("timer");
        timer
            .schedule(Arc::new(Panicker), Duration::ZERO)
            .expect("schedule");
        let counter = Counter::new();
        timer
            .schedule(counter.clone(), Duration::from_millis(5))
            .expect("schedule");

        assert!(wait_until(|| counter.get() == 1));
    }

    #[test]
    fn test_is_timer_thread() {
        let timer = ThreadTimer::new("test-timer").expect("timer");
        assert!(!timer.is_timer_thread());
    }
}
