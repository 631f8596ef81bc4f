//! Test collaborators shared by the integration tests.
//!
//! Connections, factories, locators and routers here are in-memory stand-ins
//! that count their calls so tests can assert on what resolution did.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use wayfarer_core::{
    ManualTimeProvider, Properties, Providers, SeededRandomProvider, Timer, TimerError, TimerTask,
    TimerToken,
};
use wayfarer_transport::{
    AcmConfig, AcmMonitor, ConnectError, Connection, ConnectionFactory, Endpoint, Identity, Locator,
    LocatorError, MonitorError, ProxyRuntime, Reference, ReferenceBuilder, Router, RouterError,
};

/// Install a test-friendly tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// How a [`MockConnection`] behaves when monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorBehavior {
    Ok,
    Fail,
    Panic,
    /// Block the monitoring thread for the given time, then succeed.
    Stall(Duration),
}

/// In-memory connection counting its monitor calls.
#[derive(Debug)]
pub struct MockConnection {
    endpoint: Endpoint,
    usable: AtomicBool,
    monitored: AtomicUsize,
    behavior: Mutex<MonitorBehavior>,
    last_config: Mutex<Option<AcmConfig>>,
    monitor: Mutex<Option<Arc<dyn AcmMonitor>>>,
}

impl MockConnection {
    pub fn new(endpoint: Endpoint) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            usable: AtomicBool::new(true),
            monitored: AtomicUsize::new(0),
            behavior: Mutex::new(MonitorBehavior::Ok),
            last_config: Mutex::new(None),
            monitor: Mutex::new(None),
        })
    }

    pub fn with_behavior(endpoint: Endpoint, behavior: MonitorBehavior) -> Arc<Self> {
        let connection = Self::new(endpoint);
        connection.set_behavior(behavior);
        connection
    }

    pub fn set_behavior(&self, behavior: MonitorBehavior) {
        *self.behavior.lock().expect("behavior lock") = behavior;
    }

    /// Close the connection, leaving and reaping through its monitor.
    pub fn close(self: &Arc<Self>) {
        self.usable.store(false, Ordering::SeqCst);
        let monitor = self.monitor.lock().expect("monitor lock").take();
        if let Some(monitor) = monitor {
            let connection: Arc<dyn Connection> = self.clone();
            monitor.remove(&connection);
            monitor.reap(connection);
        }
    }

    /// Mark the connection unusable without telling its monitor.
    pub fn lose(&self) {
        self.usable.store(false, Ordering::SeqCst);
    }

    pub fn has_monitor(&self) -> bool {
        self.monitor.lock().expect("monitor lock").is_some()
    }

    pub fn monitored(&self) -> usize {
        self.monitored.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<AcmConfig> {
        *self.last_config.lock().expect("config lock")
    }
}

impl Connection for MockConnection {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }

    fn monitor(&self, _now: Instant, config: &AcmConfig) -> Result<(), MonitorError> {
        self.monitored.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock().expect("config lock") = Some(*config);
        let behavior = *self.behavior.lock().expect("behavior lock");
        match behavior {
            MonitorBehavior::Ok => Ok(()),
            MonitorBehavior::Stall(duration) => {
                std::thread::sleep(duration);
                Ok(())
            }
            MonitorBehavior::Fail => Err(MonitorError::Heartbeat {
                message: "peer unreachable".to_string(),
            }),
            MonitorBehavior::Panic => panic!("monitor exploded"),
        }
    }

    fn set_monitor(&self, monitor: Arc<dyn AcmMonitor>) {
        *self.monitor.lock().expect("monitor lock") = Some(monitor);
    }
}

/// Upcast helper for trait-object APIs.
pub fn as_dyn(connection: &Arc<MockConnection>) -> Arc<dyn Connection> {
    connection.clone()
}

/// Factory refusing a configurable set of endpoints.
///
/// With a gate set, every attempt is recorded and then waits for the gate
/// returned by [`ScriptedConnectionFactory::gate`] to be notified.
#[derive(Default)]
pub struct ScriptedConnectionFactory {
    refused: Mutex<HashSet<(String, u16)>>,
    attempts: Mutex<Vec<Endpoint>>,
    opened: Mutex<Vec<Arc<MockConnection>>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedConnectionFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self, host: &str, port: u16) {
        self.refused
            .lock()
            .expect("refused lock")
            .insert((host.to_string(), port));
    }

    pub fn attempts(&self) -> Vec<Endpoint> {
        self.attempts.lock().expect("attempts lock").clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().expect("attempts lock").len()
    }

    pub fn opened(&self) -> Vec<Arc<MockConnection>> {
        self.opened.lock().expect("opened lock").clone()
    }

    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().expect("gate lock") = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedConnectionFactory {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Connection>, ConnectError> {
        self.attempts
            .lock()
            .expect("attempts lock")
            .push(endpoint.clone());
        let gate = self.gate.lock().expect("gate lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let refused = self
            .refused
            .lock()
            .expect("refused lock")
            .contains(&(endpoint.host.clone(), endpoint.port));
        if refused {
            return Err(ConnectError::Refused {
                endpoint: endpoint.clone(),
            });
        }

        let connection = MockConnection::new(endpoint.clone());
        self.opened
            .lock()
            .expect("opened lock")
            .push(connection.clone());
        Ok(connection)
    }
}

/// Locator answering from fixed tables and counting requests.
///
/// With a gate set, every request is counted and then waits for the gate
/// returned by [`CountingLocator::gate`] to be notified.
#[derive(Default)]
pub struct CountingLocator {
    adapters: Mutex<HashMap<String, Reference>>,
    objects: Mutex<HashMap<Identity, Reference>>,
    adapter_calls: AtomicUsize,
    object_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl CountingLocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_adapter(&self, adapter_id: &str, proxy: Reference) {
        self.adapters
            .lock()
            .expect("adapters lock")
            .insert(adapter_id.to_string(), proxy);
    }

    pub fn register_object(&self, identity: Identity, proxy: Reference) {
        self.objects
            .lock()
            .expect("objects lock")
            .insert(identity, proxy);
    }

    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().expect("gate lock") = Some(gate.clone());
        gate
    }

    pub fn adapter_calls(&self) -> usize {
        self.adapter_calls.load(Ordering::SeqCst)
    }

    pub fn object_calls(&self) -> usize {
        self.object_calls.load(Ordering::SeqCst)
    }

    async fn wait_gate(&self) {
        let gate = self.gate.lock().expect("gate lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl Locator for CountingLocator {
    async fn find_adapter_by_id(&self, adapter_id: &str) -> Result<Option<Reference>, LocatorError> {
        self.adapter_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        Ok(self
            .adapters
            .lock()
            .expect("adapters lock")
            .get(adapter_id)
            .cloned())
    }

    async fn find_object_by_id(&self, identity: &Identity) -> Result<Option<Reference>, LocatorError> {
        self.object_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        Ok(self
            .objects
            .lock()
            .expect("objects lock")
            .get(identity)
            .cloned())
    }
}

/// Router with a fixed client proxy.
pub struct StaticRouter {
    client: Option<Reference>,
    calls: AtomicUsize,
}

impl StaticRouter {
    pub fn new(client: Option<Reference>) -> Arc<Self> {
        Arc::new(Self {
            client,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Router for StaticRouter {
    async fn get_client_proxy(&self) -> Result<Option<Reference>, RouterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }

    async fn get_server_proxy(&self) -> Result<Option<Reference>, RouterError> {
        Ok(self.client.clone())
    }
}

struct ManualEntry {
    task: Arc<dyn TimerTask>,
    repeated: bool,
}

/// Timer that only runs tasks when the test calls [`ManualTimer::fire`].
#[derive(Default)]
pub struct ManualTimer {
    next: AtomicU64,
    entries: Mutex<BTreeMap<TimerToken, ManualEntry>>,
    cancelled: AtomicUsize,
}

impl ManualTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run every scheduled task once, one-shot tasks are then dropped.
    pub fn fire(&self) -> usize {
        let due: Vec<Arc<dyn TimerTask>> = {
            let mut entries = self.entries.lock().expect("entries lock");
            let due = entries.values().map(|e| Arc::clone(&e.task)).collect();
            entries.retain(|_, e| e.repeated);
            due
        };
        for task in &due {
            task.run_timer_task();
        }
        due.len()
    }

    pub fn scheduled(&self) -> usize {
        self.entries.lock().expect("entries lock").len()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn insert(&self, task: Arc<dyn TimerTask>, repeated: bool) -> TimerToken {
        let token = TimerToken::new(self.next.fetch_add(1, Ordering::SeqCst));
        self.entries
            .lock()
            .expect("entries lock")
            .insert(token, ManualEntry { task, repeated });
        token
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, task: Arc<dyn TimerTask>, _delay: Duration) -> Result<TimerToken, TimerError> {
        Ok(self.insert(task, false))
    }

    fn schedule_repeated(
        &self,
        task: Arc<dyn TimerTask>,
        period: Duration,
    ) -> Result<TimerToken, TimerError> {
        if period.is_zero() {
            return Err(TimerError::InvalidPeriod);
        }
        Ok(self.insert(task, true))
    }

    fn cancel(&self, token: TimerToken) -> bool {
        let removed = self
            .entries
            .lock()
            .expect("entries lock")
            .remove(&token)
            .is_some();
        if removed {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }
}

/// A runtime on a manual clock, a seeded RNG and a manual timer.
pub struct TestRuntime {
    pub runtime: ProxyRuntime,
    pub clock: ManualTimeProvider,
    pub timer: Arc<ManualTimer>,
    pub factory: Arc<ScriptedConnectionFactory>,
}

impl TestRuntime {
    pub fn new() -> Self {
        Self::with_properties(&Properties::new())
    }

    pub fn with_properties(properties: &Properties) -> Self {
        init_tracing();
        let clock = ManualTimeProvider::new();
        let timer = ManualTimer::new();
        let factory = ScriptedConnectionFactory::new();
        let providers = Providers::new(
            Arc::new(clock.clone()),
            Arc::new(SeededRandomProvider::new(42)),
            timer.clone(),
        );
        let runtime = ProxyRuntime::new(properties, providers, factory.clone());
        Self {
            runtime,
            clock,
            timer,
            factory,
        }
    }

    /// Reference to `name` with the runtime defaults.
    pub fn reference(&self, name: &str) -> ReferenceBuilder {
        self.runtime.reference(Identity::new(name))
    }

    /// Locator info backed by `locator`, reachable through a `Locator` proxy.
    pub fn locator(&self, locator: Arc<CountingLocator>) -> Arc<wayfarer_transport::LocatorInfo> {
        let proxy = self
            .reference("Locator")
            .endpoints(vec![Endpoint::tcp("locator", 4061)])
            .build()
            .expect("locator proxy");
        self.runtime.locator_info(proxy, locator)
    }
}
