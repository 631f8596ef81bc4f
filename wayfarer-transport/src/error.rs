//! Error types for reference mutation, resolution and connection handling.

use crate::{EncodingVersion, Endpoint, LocatorError, ProtocolVersion, RouterError};

/// Errors returned by `change_*` operations and reference construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    /// The operation changes the target of a reference bound to a connection.
    #[error("fixed proxy: `{operation}` cannot be applied to a connection-bound reference")]
    FixedProxy {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// The identity has an empty name.
    #[error("illegal identity `{identity}`: name must not be empty")]
    IllegalIdentity {
        /// Stringified rejected identity.
        identity: String,
    },

    /// The encoding version cannot be produced by this runtime.
    #[error("unsupported encoding version {version}")]
    UnsupportedEncoding {
        /// The rejected version.
        version: EncodingVersion,
    },

    /// The protocol version cannot be spoken by this runtime.
    #[error("unsupported protocol version {version}")]
    UnsupportedProtocol {
        /// The rejected version.
        version: ProtocolVersion,
    },
}

/// Errors returned by [`Reference::get_connection`](crate::Reference::get_connection).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolutionError {
    /// No endpoint produced a connection.
    #[error("no suitable endpoint available for proxy `{proxy}`")]
    NoEndpoint {
        /// Stringified reference that failed to resolve.
        proxy: String,
        /// Error of the last connection attempt, if any was made.
        last_error: Option<ConnectError>,
    },

    /// The connection a fixed reference is bound to is no longer usable.
    #[error("connection of fixed proxy `{proxy}` is lost")]
    ConnectionLost {
        /// Stringified fixed reference.
        proxy: String,
    },

    /// Locator lookup failed.
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Router query failed.
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Errors returned by a [`ConnectionFactory`](crate::ConnectionFactory).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The peer refused the connection.
    #[error("connection to `{endpoint}` refused")]
    Refused {
        /// Endpoint that refused.
        endpoint: Endpoint,
    },

    /// The connection was not established within the endpoint timeout.
    #[error("connection to `{endpoint}` timed out")]
    Timeout {
        /// Endpoint that timed out.
        endpoint: Endpoint,
    },

    /// Any other transport failure.
    #[error("connection to `{endpoint}` failed: {message}")]
    Io {
        /// Endpoint being connected.
        endpoint: Endpoint,
        /// Details about the failure.
        message: String,
    },
}

/// Errors a connection reports from its monitor callback.
///
/// Monitors log and suppress these; they never reach an invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// Sending a heartbeat failed.
    #[error("heartbeat failed: {message}")]
    Heartbeat {
        /// Details about the failure.
        message: String,
    },

    /// Closing an idle connection failed.
    #[error("idle close failed: {message}")]
    Close {
        /// Details about the failure.
        message: String,
    },
}
