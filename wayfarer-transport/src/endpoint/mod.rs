//! Transport endpoints and their stringified form.
//!
//! An endpoint is an immutable value naming a transport, a host and a port,
//! plus the per-endpoint timeout, compression flag and connection id that
//! reference overrides rewrite at resolution time.
//!
//! ```text
//! tcp -h host.example -p 10000 -t 60000 -z
//! ^^^    ^^^^^^^^^^^^    ^^^^^    ^^^^^ ^^
//! transport   host       port    timeout compress
//! ```

mod selection;

pub use selection::{
    filter_endpoints, select, EndpointSelection, ParseEndpointSelectionError,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Endpoint timeout used when none is given, in milliseconds.
pub const DEFAULT_ENDPOINT_TIMEOUT_MS: i32 = 60_000;

/// Transport an endpoint is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Transport {
    /// Plain TCP.
    Tcp,
    /// TCP with TLS.
    Ssl,
    /// UDP datagrams.
    Udp,
    /// WebSocket.
    Ws,
    /// WebSocket over TLS.
    Wss,
}

impl Transport {
    /// Protocol keyword used in the stringified form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Ssl => "ssl",
            Self::Udp => "udp",
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }

    /// Whether the transport is encrypted.
    pub fn is_secure(self) -> bool {
        matches!(self, Self::Ssl | Self::Wss)
    }

    /// Whether the transport carries datagrams.
    pub fn is_datagram(self) -> bool {
        self == Self::Udp
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a stringified endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseEndpointError {
    /// The string was empty.
    #[error("empty endpoint")]
    Empty,

    /// The protocol keyword is not a known transport.
    #[error("unknown transport `{0}`")]
    UnknownTransport(String),

    /// An option that needs an argument had none.
    #[error("option `{0}` requires an argument")]
    MissingArgument(String),

    /// An option is not recognized.
    #[error("unknown endpoint option `{0}`")]
    UnknownOption(String),

    /// The port is not in `0..=65535`.
    #[error("invalid port `{0}`")]
    InvalidPort(String),

    /// The timeout is neither `infinite` nor a positive integer.
    #[error("invalid timeout `{0}`")]
    InvalidTimeout(String),
}

/// Network address of a server, as used by references and connections.
///
/// # Examples
///
/// ```
/// use wayfarer_transport::{Endpoint, Transport};
///
/// let endpoint: Endpoint = "ssl -h db.internal -p 4063 -t 5000".parse().expect("valid");
/// assert_eq!(endpoint.transport, Transport::Ssl);
/// assert!(endpoint.is_secure());
/// assert_eq!(endpoint.to_string(), "ssl -h db.internal -p 4063 -t 5000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// Transport protocol.
    pub transport: Transport,
    /// Host name or address.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Connect and I/O timeout in milliseconds, `-1` for infinite.
    pub timeout: i32,
    /// Whether requests over this endpoint are compressed.
    pub compress: bool,
    /// Connections with different ids are never shared.
    pub connection_id: String,
}

impl Endpoint {
    /// Endpoint with the default timeout, no compression and no connection id.
    pub fn new(transport: Transport, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport,
            host: host.into(),
            port,
            timeout: DEFAULT_ENDPOINT_TIMEOUT_MS,
            compress: false,
            connection_id: String::new(),
        }
    }

    /// Shorthand for a TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(Transport::Tcp, host, port)
    }

    /// Shorthand for an SSL endpoint.
    pub fn ssl(host: impl Into<String>, port: u16) -> Self {
        Self::new(Transport::Ssl, host, port)
    }

    /// Shorthand for a UDP endpoint.
    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self::new(Transport::Udp, host, port)
    }

    /// Whether the endpoint is encrypted.
    pub fn is_secure(&self) -> bool {
        self.transport.is_secure()
    }

    /// Whether the endpoint carries datagrams.
    pub fn is_datagram(&self) -> bool {
        self.transport.is_datagram()
    }

    /// Copy with a different timeout.
    pub fn with_timeout(&self, timeout: i32) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    /// Copy with a different compression flag.
    pub fn with_compress(&self, compress: bool) -> Self {
        Self {
            compress,
            ..self.clone()
        }
    }

    /// Copy with a different connection id.
    pub fn with_connection_id(&self, connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.transport)?;
        if !self.host.is_empty() {
            if self.host.contains(':') {
                write!(f, " -h \"{}\"", self.host)?;
            } else {
                write!(f, " -h {}", self.host)?;
            }
        }
        write!(f, " -p {}", self.port)?;
        if self.timeout == -1 {
            write!(f, " -t infinite")?;
        } else {
            write!(f, " -t {}", self.timeout)?;
        }
        if self.compress {
            write!(f, " -z")?;
        }
        Ok(())
    }
}

impl FromStr for Endpoint {
    type Err = ParseEndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let transport = match tokens.next() {
            None => return Err(ParseEndpointError::Empty),
            Some("tcp") => Transport::Tcp,
            Some("ssl") => Transport::Ssl,
            Some("udp") => Transport::Udp,
            Some("ws") => Transport::Ws,
            Some("wss") => Transport::Wss,
            Some(other) => return Err(ParseEndpointError::UnknownTransport(other.to_string())),
        };

        let mut endpoint = Endpoint::new(transport, "", 0);
        while let Some(option) = tokens.next() {
            match option {
                "-z" => endpoint.compress = true,
                "-h" | "-p" | "-t" => {
                    let argument = tokens
                        .next()
                        .ok_or_else(|| ParseEndpointError::MissingArgument(option.to_string()))?;
                    match option {
                        "-h" => endpoint.host = argument.trim_matches('"').to_string(),
                        "-p" => {
                            endpoint.port = argument.parse().map_err(|_| {
                                ParseEndpointError::InvalidPort(argument.to_string())
                            })?;
                        }
                        _ => endpoint.timeout = parse_timeout(argument)?,
                    }
                }
                other => return Err(ParseEndpointError::UnknownOption(other.to_string())),
            }
        }
        Ok(endpoint)
    }
}

fn parse_timeout(argument: &str) -> Result<i32, ParseEndpointError> {
    if argument == "infinite" {
        return Ok(-1);
    }
    match argument.parse::<i32>() {
        Ok(timeout) if timeout >= 1 => Ok(timeout),
        _ => Err(ParseEndpointError::InvalidTimeout(argument.to_string())),
    }
}
