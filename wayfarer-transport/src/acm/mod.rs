//! Active connection management.
//!
//! Every live connection is registered with exactly one monitor. The monitor
//! owns a repeating [`Timer`](wayfarer_core::Timer) task that calls
//! [`Connection::monitor`](crate::Connection::monitor) on its connections
//! every `timeout / 2`; the connection then decides, through
//! [`AcmActivity::evaluate`], whether to heartbeat or to close.
//!
//! ```text
//!              ┌──────────────────────┐   acm(..)   ┌─────────────────────────┐
//!  add/remove ►│  FactoryAcmMonitor   │────────────►│  ConnectionAcmMonitor   │
//!              │  set + pending queue │◄────────────│  one connection         │
//!              │  one timer task      │ reap/faults │  own timer task         │
//!              └──────────────────────┘             └─────────────────────────┘
//! ```
//!
//! Connections using the runtime-wide settings share the factory monitor;
//! a connection whose settings are overridden gets its own monitor, which
//! reports faults and reaped connections to the factory it came from.

mod activity;
mod config;
mod connection;
mod factory;

pub use activity::{AcmAction, AcmActivity, CloseMode};
pub use config::{AcmClose, AcmConfig, AcmHeartbeat};
pub use connection::ConnectionAcmMonitor;
pub use factory::FactoryAcmMonitor;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::Connection;

/// Contract shared by the factory-wide and per-connection monitors.
pub trait AcmMonitor: Send + Sync + fmt::Debug {
    /// Start monitoring `connection`. No-op when monitoring is disabled.
    fn add(&self, connection: Arc<dyn Connection>);

    /// Stop monitoring `connection`.
    fn remove(&self, connection: &Arc<dyn Connection>);

    /// Hand a closed connection over to the reaper.
    fn reap(&self, connection: Arc<dyn Connection>);

    /// Monitor for a connection whose settings differ from this monitor's.
    ///
    /// `None` fields keep this monitor's value.
    fn acm(
        &self,
        timeout: Option<Duration>,
        close: Option<AcmClose>,
        heartbeat: Option<AcmHeartbeat>,
    ) -> ConnectionAcmMonitor;

    /// Settings applied to monitored connections.
    fn get_acm(&self) -> AcmConfig;

    /// One monitoring pass. Called by the timer task.
    fn monitor_tick(&self, now: Instant);
}
