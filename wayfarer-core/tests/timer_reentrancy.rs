//! Tests for tasks calling back into their own timer.
//!
//! Tests verify that:
//! - A task can cancel itself and schedule follow-up work without deadlocking
//! - One-shot tasks run in deadline order
//! - `destroy` from the timer thread returns instead of joining itself

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use wayfarer_core::{Providers, ThreadTimer, Timer, TimerTask, TimerToken};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
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

/// Repeating task that cancels itself after `limit` runs and then
/// schedules a one-shot follow-up.
struct SelfCancelling {
    timer: Arc<ThreadTimer>,
    token: OnceLock<TimerToken>,
    runs: AtomicUsize,
    limit: usize,
    follow_up: Arc<Recorder>,
}

impl TimerTask for SelfCancelling {
    fn run_timer_task(&self) {
        let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if runs == self.limit {
            if let Some(token) = self.token.get() {
                assert!(self.timer.cancel(*token));
            }
            self.timer
                .schedule(self.follow_up.clone(), Duration::ZERO)
                .expect("schedule follow-up");
        }
    }
}

#[derive(Default)]
struct Recorder {
    order: Mutex<Vec<&'static str>>,
    label: &'static str,
    shared: Option<Arc<Mutex<Vec<&'static str>>>>,
}

impl Recorder {
    fn labelled(label: &'static str, shared: Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self {
            order: Mutex::new(Vec::new()),
            label,
            shared: Some(shared),
        })
    }

    fn count(&self) -> usize {
        self.order.lock().expect("order lock").len()
    }
}

impl TimerTask for Recorder {
    fn run_timer_task(&self) {
        self.order.lock().expect("order lock").push(self.label);
        if let Some(shared) = &self.shared {
            shared.lock().expect("shared lock").push(self.label);
        }
    }
}

#[test]
fn test_task_cancels_itself_and_schedules_follow_up() {
    init_tracing();
    let timer = Arc::new(ThreadTimer::new("reentrant-timer").expect("timer"));
    let follow_up = Arc::new(Recorder::default());
    let task = Arc::new(SelfCancelling {
        timer: timer.clone(),
        token: OnceLock::new(),
        runs: AtomicUsize::new(0),
        limit: 3,
        follow_up: follow_up.clone(),
    });

    let token = timer
        .schedule_repeated(task.clone(), Duration::from_millis(5))
        .expect("schedule");
    task.token.set(token).expect("token set once");

    assert!(wait_until(|| follow_up.count() == 1));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(task.runs.load(Ordering::SeqCst), 3);
    assert!(!timer.cancel(token));

    timer.destroy();
}

#[test]
fn test_one_shot_tasks_run_in_deadline_order() {
    init_tracing();
    let timer = ThreadTimer::new("ordering-timer").expect("timer");
    let shared = Arc::new(Mutex::new(Vec::new()));

    timer
        .schedule(Recorder::labelled("late", shared.clone()), Duration::from_millis(40))
        .expect("schedule late");
    timer
        .schedule(Recorder::labelled("early", shared.clone()), Duration::from_millis(5))
        .expect("schedule early");

    assert!(wait_until(|| shared.lock().expect("shared lock").len() == 2));
    assert_eq!(*shared.lock().expect("shared lock"), vec!["early", "late"]);

    timer.destroy();
}

struct DestroyFromTask {
    timer: Arc<ThreadTimer>,
    done: AtomicUsize,
}

impl TimerTask for DestroyFromTask {
    fn run_timer_task(&self) {
        assert!(self.timer.is_timer_thread());
        self.timer.destroy();
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_destroy_from_timer_thread_does_not_join_itself() {
    init_tracing();
    let timer = Arc::new(ThreadTimer::new("self-destroy-timer").expect("timer"));
    let task = Arc::new(DestroyFromTask {
        timer: timer.clone(),
        done: AtomicUsize::new(0),
    });

    timer.schedule(task.clone(), Duration::ZERO).expect("schedule");

    assert!(wait_until(|| task.done.load(Ordering::SeqCst) == 1));
    assert!(timer.schedule(task.clone(), Duration::ZERO).is_err());
}

#[test]
fn test_system_providers_own_their_timer() {
    init_tracing();
    let providers = Providers::system().expect("providers");
    let recorder = Arc::new(Recorder::default());

    providers
        .timer()
        .schedule(recorder.clone(), Duration::ZERO)
        .expect("schedule");
    assert!(wait_until(|| recorder.count() == 1));

    providers.destroy();
    assert!(providers
        .timer()
        .schedule(recorder.clone(), Duration::ZERO)
        .is_err());
}
