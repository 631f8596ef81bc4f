//! Configuration structures for active connection management.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wayfarer_core::Properties;

/// When a connection sends heartbeats to keep its peer from closing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcmHeartbeat {
    /// Never.
    Off,
    /// Peer-driven only; no proactive heartbeat.
    OnDispatch,
    /// When the connection has been idle for a quarter of the timeout.
    OnIdle,
    /// Invocation-driven only; no proactive heartbeat.
    OnInvocation,
    /// On every monitor tick.
    Always,
}

impl AcmHeartbeat {
    /// Map a configuration code (`0..=4`) to a policy.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::OnDispatch),
            2 => Some(Self::OnIdle),
            3 => Some(Self::OnInvocation),
            4 => Some(Self::Always),
            _ => None,
        }
    }
}

/// When an idle connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcmClose {
    /// Never.
    Off,
    /// Gracefully once idle, even with requests pending.
    OnIdle,
    /// Gracefully once idle with no outstanding invocation.
    OnInvocation,
    /// Gracefully once idle with no outstanding invocation and no dispatch.
    OnInvocationAndIdle,
    /// Forcefully once idle.
    OnIdleForceful,
}

impl AcmClose {
    /// Map a configuration code (`0..=4`) to a policy.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::OnIdle),
            2 => Some(Self::OnInvocation),
            3 => Some(Self::OnInvocationAndIdle),
            4 => Some(Self::OnIdleForceful),
            _ => None,
        }
    }
}

/// Idle timeout plus heartbeat and close policies of a monitor.
///
/// A zero `timeout` disables monitoring for the connections using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmConfig {
    /// Idle time after which the close policy applies.
    pub timeout: Duration,

    /// Heartbeat policy.
    pub heartbeat: AcmHeartbeat,

    /// Close policy.
    pub close: AcmClose,
}

impl Default for AcmConfig {
    fn default() -> Self {
        Self::client()
    }
}

impl AcmConfig {
    /// Default timeout of both roles.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Defaults for outgoing connections.
    pub fn client() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            heartbeat: AcmHeartbeat::OnDispatch,
            close: AcmClose::OnInvocation,
        }
    }

    /// Defaults for incoming connections.
    pub fn server() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            heartbeat: AcmHeartbeat::OnDispatch,
            close: AcmClose::OnInvocationAndIdle,
        }
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the heartbeat policy.
    pub fn with_heartbeat(mut self, heartbeat: AcmHeartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the close policy.
    pub fn with_close(mut self, close: AcmClose) -> Self {
        self.close = close;
        self
    }

    /// Whether connections using this config are monitored at all.
    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    /// Period of the monitor task: half the timeout.
    pub fn monitor_period(&self) -> Duration {
        self.timeout / 2
    }

    /// Read `<prefix>.Timeout`, `<prefix>.Heartbeat` and `<prefix>.Close`.
    ///
    /// Unset keys keep the value from `defaults`. Malformed or out-of-range
    /// values log a warning and also keep the default.
    ///
    /// ```
    /// use std::time::Duration;
    /// use wayfarer_core::Properties;
    /// use wayfarer_transport::{AcmClose, AcmConfig};
    ///
    /// let props = Properties::from_iter([("ACM.Client.Timeout", "10"), ("ACM.Client.Close", "4")]);
    /// let config = AcmConfig::from_properties(&props, "ACM.Client", AcmConfig::client());
    /// assert_eq!(config.timeout, Duration::from_secs(10));
    /// assert_eq!(config.close, AcmClose::OnIdleForceful);
    /// ```
    pub fn from_properties(properties: &Properties, prefix: &str, defaults: AcmConfig) -> Self {
        let mut config = defaults;

        let key = format!("{prefix}.Timeout");
        if let Some(seconds) = properties.get_int(&key) {
            match u64::try_from(seconds) {
                Ok(seconds) => config.timeout = Duration::from_secs(seconds),
                Err(_) => tracing::warn!(
                    property = %key,
                    value = seconds,
                    default = ?defaults.timeout,
                    "invalid ACM timeout, using default"
                ),
            }
        }

        let key = format!("{prefix}.Heartbeat");
        if let Some(code) = properties.get_int(&key) {
            match AcmHeartbeat::from_code(code) {
                Some(heartbeat) => config.heartbeat = heartbeat,
                None => tracing::warn!(
                    property = %key,
                    value = code,
                    default = ?defaults.heartbeat,
                    "invalid ACM heartbeat value, using default"
                ),
            }
        }

        let key = format!("{prefix}.Close");
        if let Some(code) = properties.get_int(&key) {
            match AcmClose::from_code(code) {
                Some(close) => config.close = close,
                None => tracing::warn!(
                    property = %key,
                    value = code,
                    default = ?defaults.close,
                    "invalid ACM close value, using default"
                ),
            }
        }

        config
    }
}
