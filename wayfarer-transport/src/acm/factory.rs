//! Runtime-wide monitor shared by connections with default settings.
//!
//! # Lock discipline
//!
//! The monitor lock protects the registered set, the pending change queue,
//! the reaped list and the timer token. It is never held while a connection
//! is monitored. Timer calls may happen under the monitor lock (monitor →
//! timer); the timer never calls back into the monitor while holding its own
//! lock, so the order cannot invert.
//!
//! `add`/`remove` on a non-empty set only queue the change; the next tick
//! applies queued changes in FIFO order before monitoring. Application
//! threads thus never contend with a tick for the set itself.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use wayfarer_core::{TimeProvider, Timer, TimerTask, TimerToken};

use super::{AcmClose, AcmConfig, AcmHeartbeat, AcmMonitor, ConnectionAcmMonitor};
use crate::connection::connection_id;
use crate::{Connection, MonitorError};

#[derive(Default)]
struct FactoryState {
    destroyed: bool,
    connections: HashMap<usize, Arc<dyn Connection>>,
    changes: Vec<(Arc<dyn Connection>, bool)>,
    reaped: Vec<Arc<dyn Connection>>,
    task: Option<TimerToken>,
}

pub(super) struct FactoryInner {
    config: AcmConfig,
    pub(super) timer: Arc<dyn Timer>,
    pub(super) time: Arc<dyn TimeProvider>,
    state: Mutex<FactoryState>,
    emptied: Condvar,
}

/// Monitor shared by every connection of one runtime role.
///
/// Cloning yields another handle to the same monitor.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wayfarer_core::{SystemTimeProvider, ThreadTimer};
/// use wayfarer_transport::{AcmConfig, AcmMonitor, FactoryAcmMonitor};
///
/// let timer = Arc::new(ThreadTimer::new("acm-doc").expect("timer"));
/// let monitor = FactoryAcmMonitor::new(
///     AcmConfig::client(),
///     timer.clone(),
///     Arc::new(SystemTimeProvider::new()),
/// );
/// assert_eq!(monitor.get_acm(), AcmConfig::client());
/// monitor.destroy();
/// timer.destroy();
/// ```
#[derive(Clone)]
pub struct FactoryAcmMonitor {
    inner: Arc<FactoryInner>,
}

impl FactoryAcmMonitor {
    /// Create a monitor applying `config`, ticking on `timer`.
    pub fn new(config: AcmConfig, timer: Arc<dyn Timer>, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                config,
                timer,
                time,
                state: Mutex::new(FactoryState::default()),
                emptied: Condvar::new(),
            }),
        }
    }

    /// Stop monitoring and wait until every connection is released.
    ///
    /// With connections still registered, the repeating task is replaced by
    /// an immediate one-shot tick and the caller blocks until that tick has
    /// emptied the set. Calling it again only waits.
    ///
    /// Must not be called from the timer thread of this monitor's timer.
    pub fn destroy(&self) {
        let inner = &self.inner;
        let mut state = inner.lock();
        if !state.destroyed {
            state.destroyed = true;
            state.changes.clear();

            if !state.connections.is_empty() {
                if let Some(token) = state.task.take() {
                    inner.timer.cancel(token);
                }
                let task: Arc<dyn TimerTask> = Arc::clone(inner) as Arc<dyn TimerTask>;
                if let Err(e) = inner.timer.schedule(task, Duration::ZERO) {
                    tracing::warn!(
                        error = %e,
                        connections = state.connections.len(),
                        "timer refused final monitor tick, releasing connections directly"
                    );
                    state.connections.clear();
                }
            }
        }

        let state = inner
            .emptied
            .wait_while(state, |state| !state.connections.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(reaped = state.reaped.len(), "connection monitor destroyed");
    }

    /// Take every connection reaped since the last call.
    pub fn swap_reaped_connections(&self) -> Vec<Arc<dyn Connection>> {
        std::mem::take(&mut self.inner.lock().reaped)
    }

    /// Number of connections currently monitored, pending changes excluded.
    pub fn registered_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Whether the repeating monitor task is scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.inner.lock().task.is_some()
    }
}

impl AcmMonitor for FactoryAcmMonitor {
    fn add(&self, connection: Arc<dyn Connection>) {
        let inner = &self.inner;
        if !inner.config.is_enabled() {
            return;
        }

        let mut state = inner.lock();
        if state.destroyed {
            tracing::warn!(endpoint = %connection.endpoint(), "add to destroyed connection monitor ignored");
            return;
        }

        if !state.connections.is_empty() {
            state.changes.push((connection, true));
            return;
        }

        let task: Arc<dyn TimerTask> = Arc::clone(inner) as Arc<dyn TimerTask>;
        match inner.timer.schedule_repeated(task, inner.config.monitor_period()) {
            Ok(token) => {
                state.connections.insert(connection_id(&connection), connection);
                state.task = Some(token);
            }
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %connection.endpoint(), "failed to schedule connection monitor");
            }
        }
    }

    fn remove(&self, connection: &Arc<dyn Connection>) {
        if !self.inner.config.is_enabled() {
            return;
        }

        let mut state = self.inner.lock();
        if state.destroyed {
            return;
        }
        state.changes.push((Arc::clone(connection), false));
    }

    fn reap(&self, connection: Arc<dyn Connection>) {
        self.inner.reap(connection);
    }

    fn acm(
        &self,
        timeout: Option<Duration>,
        close: Option<AcmClose>,
        heartbeat: Option<AcmHeartbeat>,
    ) -> ConnectionAcmMonitor {
        let config = self.inner.override_config(timeout, close, heartbeat);
        ConnectionAcmMonitor::new(Arc::clone(&self.inner), config)
    }

    fn get_acm(&self) -> AcmConfig {
        self.inner.config
    }

    fn monitor_tick(&self, now: Instant) {
        self.inner.monitor_tick(now);
    }
}

impl std::fmt::Debug for FactoryAcmMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryAcmMonitor")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl FactoryInner {
    fn lock(&self) -> MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Factory settings with the given fields replaced.
    pub(super) fn override_config(
        &self,
        timeout: Option<Duration>,
        close: Option<AcmClose>,
        heartbeat: Option<AcmHeartbeat>,
    ) -> AcmConfig {
        AcmConfig {
            timeout: timeout.unwrap_or(self.config.timeout),
            close: close.unwrap_or(self.config.close),
            heartbeat: heartbeat.unwrap_or(self.config.heartbeat),
        }
    }

    pub(super) fn reap(&self, connection: Arc<dyn Connection>) {
        self.lock().reaped.push(connection);
    }

    fn monitor_tick(&self, now: Instant) {
        let connections: Vec<Arc<dyn Connection>> = {
            let mut state = self.lock();
            if state.destroyed {
                state.connections.clear();
                drop(state);
                self.emptied.notify_all();
                return;
            }

            for (connection, is_add) in std::mem::take(&mut state.changes) {
                let key = connection_id(&connection);
                if is_add {
                    state.connections.insert(key, connection);
                } else {
                    state.connections.remove(&key);
                }
            }

            if state.connections.is_empty() {
                if let Some(token) = state.task.take() {
                    self.timer.cancel(token);
                }
                return;
            }
            state.connections.values().cloned().collect()
        };

        for connection in &connections {
            self.monitor_connection(connection, now, &self.config);
        }
    }

    /// Run one `monitor()` call, containing any error or panic it raises.
    pub(super) fn monitor_connection(
        &self,
        connection: &Arc<dyn Connection>,
        now: Instant,
        config: &AcmConfig,
    ) {
        match catch_unwind(AssertUnwindSafe(|| connection.monitor(now, config))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.handle_error(connection, &e),
            Err(payload) => self.handle_panic(connection, payload.as_ref()),
        }
    }

    fn handle_error(&self, connection: &Arc<dyn Connection>, error: &MonitorError) {
        if self.lock().destroyed {
            return;
        }
        tracing::error!(endpoint = %connection.endpoint(), error = %error, "exception in connection monitor");
    }

    fn handle_panic(&self, connection: &Arc<dyn Connection>, payload: &(dyn Any + Send)) {
        if self.lock().destroyed {
            return;
        }
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(endpoint = %connection.endpoint(), panic = %message, "connection monitor panicked");
    }
}

impl TimerTask for FactoryInner {
    fn run_timer_task(&self) {
        self.monitor_tick(self.time.now());
    }
}
