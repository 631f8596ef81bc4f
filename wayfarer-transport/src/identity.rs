//! Object identity, invocation mode and protocol/encoding versions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a target object: a name within an optional category.
///
/// An identity with an empty name designates no object (a null reference).
///
/// # Examples
///
/// ```
/// use wayfarer_transport::Identity;
///
/// let id = Identity::new("printer").with_category("office");
/// assert_eq!(id.to_string(), "office/printer");
/// assert!(!id.is_null());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    /// Object name. Empty only for a null identity.
    pub name: String,
    /// Optional category grouping related objects.
    pub category: String,
}

impl Identity {
    /// Create an identity without category.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
        }
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Whether this identity designates no object.
    pub fn is_null(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.category, self.name)
        }
    }
}

/// How invocations through a reference are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InvocationMode {
    /// Request with response.
    #[default]
    Twoway,
    /// Request without response over a stream transport.
    Oneway,
    /// Queued oneway requests flushed together.
    BatchOneway,
    /// Request without response over a datagram transport.
    Datagram,
    /// Queued datagram requests flushed together.
    BatchDatagram,
}

impl InvocationMode {
    /// Whether requests are queued and sent in batches.
    pub fn is_batch(self) -> bool {
        matches!(self, Self::BatchOneway | Self::BatchDatagram)
    }

    /// Whether requests expect a response.
    pub fn is_twoway(self) -> bool {
        self == Self::Twoway
    }

    /// Whether this mode needs a datagram endpoint.
    pub fn is_datagram(self) -> bool {
        matches!(self, Self::Datagram | Self::BatchDatagram)
    }

    /// Option flag used in the stringified form.
    pub(crate) fn flag(self) -> &'static str {
        match self {
            Self::Twoway => "-t",
            Self::Oneway => "-o",
            Self::BatchOneway => "-O",
            Self::Datagram => "-d",
            Self::BatchDatagram => "-D",
        }
    }
}

/// Error parsing a `major.minor` version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed version `{0}`, expected `major.minor`")]
pub struct ParseVersionError(pub String);

fn parse_version(s: &str) -> Result<(u8, u8), ParseVersionError> {
    let (major, minor) = s
        .trim()
        .split_once('.')
        .ok_or_else(|| ParseVersionError(s.to_string()))?;
    let major = major
        .parse()
        .map_err(|_| ParseVersionError(s.to_string()))?;
    let minor = minor
        .parse()
        .map_err(|_| ParseVersionError(s.to_string()))?;
    Ok((major, minor))
}

/// Version of the request protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl ProtocolVersion {
    /// Protocol 1.0, the only supported protocol.
    pub const V1_0: Self = Self { major: 1, minor: 0 };

    /// Whether this runtime can speak the protocol.
    pub fn is_supported(self) -> bool {
        self == Self::V1_0
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V1_0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = parse_version(s)?;
        Ok(Self { major, minor })
    }
}

/// Version of the payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EncodingVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl EncodingVersion {
    /// Encoding 1.0.
    pub const V1_0: Self = Self { major: 1, minor: 0 };
    /// Encoding 1.1, the default.
    pub const V1_1: Self = Self { major: 1, minor: 1 };

    /// Whether payloads in this encoding can be produced.
    pub fn is_supported(self) -> bool {
        self.major == 1 && self.minor <= 1
    }
}

impl Default for EncodingVersion {
    fn default() -> Self {
        Self::V1_1
    }
}

impl fmt::Display for EncodingVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for EncodingVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = parse_version(s)?;
        Ok(Self { major, minor })
    }
}
