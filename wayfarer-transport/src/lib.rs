//! # wayfarer-transport
//!
//! Client-side proxy resolution and active connection management.
//!
//! A proxy is backed by an immutable [`Reference`]. Resolving it yields a
//! monitored [`Connection`]:
//!
//! ```text
//! Reference ──get_connection──► [RouterInfo] ─► [LocatorInfo] ─► filter/order endpoints
//!                                                                   │
//!        ConnectionCache ◄── hit? ──────────────────────────────────┤
//!                                                                   ▼
//!                                     ConnectionFactory::connect (first success)
//!                                                                   │
//!                                     FactoryAcmMonitor::add ◄──────┘
//!                                           │ every timeout/2
//!                                           ▼
//!                                     Connection::monitor(now, config)
//! ```
//!
//! ## Modules
//!
//! | Area | Types |
//! |------|-------|
//! | Values | [`Identity`], [`Endpoint`], [`InvocationMode`], versions |
//! | References | [`Reference`], [`ReferenceBuilder`] |
//! | Indirection | [`LocatorInfo`], [`RouterInfo`] |
//! | Connections | [`Connection`], [`ConnectionFactory`], [`ConnectionCache`] |
//! | Monitoring | [`AcmMonitor`], [`FactoryAcmMonitor`], [`ConnectionAcmMonitor`], [`AcmActivity`] |
//! | Context | [`ProxyRuntime`], [`DefaultsAndOverrides`] |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod acm;
mod connection;
mod defaults;
mod endpoint;
mod error;
mod identity;
mod locator;
mod reference;
mod router;
mod runtime;

pub use acm::{
    AcmAction, AcmActivity, AcmClose, AcmConfig, AcmHeartbeat, AcmMonitor, CloseMode,
    ConnectionAcmMonitor, FactoryAcmMonitor,
};
pub use connection::{
    CacheLookup, Connection, ConnectionCache, ConnectionFactory, ConnectionKey,
};
pub use defaults::DefaultsAndOverrides;
pub use endpoint::{
    filter_endpoints, select, Endpoint, EndpointSelection, ParseEndpointError,
    ParseEndpointSelectionError, Transport, DEFAULT_ENDPOINT_TIMEOUT_MS,
};
pub use error::{ConnectError, MonitorError, ReferenceError, ResolutionError};
pub use identity::{EncodingVersion, Identity, InvocationMode, ParseVersionError, ProtocolVersion};
pub use locator::{Locator, LocatorEndpoints, LocatorError, LocatorInfo};
pub use reference::{ConnectionFuture, Context, Reference, ReferenceBuilder};
pub use router::{Router, RouterError, RouterInfo};
pub use runtime::ProxyRuntime;
