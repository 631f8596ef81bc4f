//! Per-connection monitor used when a connection overrides its ACM settings.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use wayfarer_core::{TimerTask, TimerToken};

use super::factory::FactoryInner;
use super::{AcmClose, AcmConfig, AcmHeartbeat, AcmMonitor};
use crate::Connection;

#[derive(Default)]
struct BoundConnection {
    connection: Option<Arc<dyn Connection>>,
    task: Option<TimerToken>,
}

struct ConnectionInner {
    parent: Arc<FactoryInner>,
    config: AcmConfig,
    state: Mutex<BoundConnection>,
}

/// Monitor owning at most one connection and its own timer task.
///
/// Created through [`AcmMonitor::acm`]. Faults and reaped connections are
/// forwarded to the factory monitor it was created from.
#[derive(Clone)]
pub struct ConnectionAcmMonitor {
    inner: Arc<ConnectionInner>,
}

impl ConnectionAcmMonitor {
    pub(super) fn new(parent: Arc<FactoryInner>, config: AcmConfig) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                parent,
                config,
                state: Mutex::new(BoundConnection::default()),
            }),
        }
    }

    /// Whether a connection is currently bound.
    pub fn is_bound(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    /// Whether the monitor task is scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.inner.lock().task.is_some()
    }
}

impl ConnectionInner {
    fn lock(&self) -> MutexGuard<'_, BoundConnection> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn monitor_tick(&self, now: Instant) {
        let connection = self.lock().connection.clone();
        if let Some(connection) = connection {
            self.parent
                .monitor_connection(&connection, now, &self.config);
        }
    }
}

impl TimerTask for ConnectionInner {
    fn run_timer_task(&self) {
        self.monitor_tick(self.parent.time.now());
    }
}

impl AcmMonitor for ConnectionAcmMonitor {
    fn add(&self, connection: Arc<dyn Connection>) {
        let inner = &self.inner;
        let mut state = inner.lock();
        if let Some(previous) = &state.connection {
            tracing::warn!(
                previous = %previous.endpoint(),
                endpoint = %connection.endpoint(),
                "connection monitor already bound, replacing connection"
            );
        }
        state.connection = Some(Arc::clone(&connection));

        if !inner.config.is_enabled() || state.task.is_some() {
            return;
        }
        let task: Arc<dyn TimerTask> = Arc::clone(inner) as Arc<dyn TimerTask>;
        match inner
            .parent
            .timer
            .schedule_repeated(task, inner.config.monitor_period())
        {
            Ok(token) => state.task = Some(token),
            Err(e) => tracing::warn!(
                error = %e,
                endpoint = %connection.endpoint(),
                "failed to schedule connection monitor"
            ),
        }
    }

    fn remove(&self, _connection: &Arc<dyn Connection>) {
        let mut state = self.inner.lock();
        if let Some(token) = state.task.take() {
            self.inner.parent.timer.cancel(token);
        }
        state.connection = None;
    }

    fn reap(&self, connection: Arc<dyn Connection>) {
        self.inner.parent.reap(connection);
    }

    fn acm(
        &self,
        timeout: Option<Duration>,
        close: Option<AcmClose>,
        heartbeat: Option<AcmHeartbeat>,
    ) -> ConnectionAcmMonitor {
        let parent = &self.inner.parent;
        let config = parent.override_config(timeout, close, heartbeat);
        ConnectionAcmMonitor::new(Arc::clone(parent), config)
    }

    fn get_acm(&self) -> AcmConfig {
        self.inner.config
    }

    fn monitor_tick(&self, now: Instant) {
        self.inner.monitor_tick(now);
    }
}

impl std::fmt::Debug for ConnectionAcmMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAcmMonitor")
            .field("config", &self.inner.config)
            .field("bound", &self.is_bound())
            .finish()
    }
}
