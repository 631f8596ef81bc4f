//! Connection collaborator traits and the shared connection cache.
//!
//! Establishing sockets and framing messages happen outside this crate. What
//! resolution and monitoring need from a connection is captured by
//! [`Connection`]; how a new one is opened is captured by
//! [`ConnectionFactory`].

mod cache;

pub use cache::{CacheLookup, ConnectionCache, ConnectionKey};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::{AcmConfig, AcmMonitor, ConnectError, Endpoint, MonitorError};

/// An established connection as seen by resolution and monitoring.
pub trait Connection: Send + Sync + fmt::Debug {
    /// Endpoint the connection was established to.
    fn endpoint(&self) -> &Endpoint;

    /// Whether the connection can still carry requests.
    fn is_usable(&self) -> bool;

    /// Periodic check driven by an ACM monitor.
    ///
    /// Sends a heartbeat or closes the connection according to `config`.
    /// Errors are logged by the monitor and otherwise ignored.
    fn monitor(&self, now: Instant, config: &AcmConfig) -> Result<(), MonitorError>;

    /// Monitor this connection is registered with.
    ///
    /// Called before the connection is added to `monitor`, and again when
    /// it moves to another one. On close the connection calls
    /// [`AcmMonitor::remove`] and then [`AcmMonitor::reap`] on the monitor
    /// it last received.
    fn set_monitor(&self, _monitor: Arc<dyn AcmMonitor>) {}
}

/// Opens new connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Establish a connection to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Connection>, ConnectError>;
}

/// Address of the connection object, used as its identity.
pub(crate) fn connection_id(connection: &Arc<dyn Connection>) -> usize {
    Arc::as_ptr(connection) as *const () as usize
}
