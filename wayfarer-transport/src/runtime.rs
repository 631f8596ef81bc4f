//! Per-process resolution context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use wayfarer_core::{Properties, Providers};

use crate::{
    AcmConfig, ConnectionCache, ConnectionFactory, DefaultsAndOverrides, FactoryAcmMonitor,
    Identity, Locator, LocatorInfo, Reference, ReferenceBuilder, Router, RouterInfo,
};

/// Everything references need to resolve: providers, defaults, the
/// connection factory, the shared connection cache and the client and
/// server connection monitors.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wayfarer_core::{Properties, Providers};
/// use wayfarer_transport::{ConnectionFactory, Endpoint, Identity, ProxyRuntime};
///
/// async fn connect_hello(
///     factory: Arc<dyn ConnectionFactory>,
/// ) -> Result<(), Box<dyn std::error::Error>> {
///     let runtime = ProxyRuntime::new(&Properties::new(), Providers::system()?, factory);
///     let reference = runtime
///         .reference(Identity::new("hello"))
///         .endpoints(vec![Endpoint::tcp("localhost", 10000)])
///         .build()?;
///     let connection = reference.get_connection(&runtime).await?;
///     assert_eq!(connection.endpoint().port, 10000);
///     runtime.destroy();
///     Ok(())
/// }
/// ```
pub struct ProxyRuntime {
    providers: Providers,
    defaults: DefaultsAndOverrides,
    connection_factory: Arc<dyn ConnectionFactory>,
    connection_cache: ConnectionCache,
    client_acm: FactoryAcmMonitor,
    server_acm: FactoryAcmMonitor,
    locators: Mutex<HashMap<Reference, Arc<LocatorInfo>>>,
    routers: Mutex<HashMap<Reference, Arc<RouterInfo>>>,
}

impl ProxyRuntime {
    /// Create a runtime configured from `properties`.
    ///
    /// Reads `Default.*`, `Override.*`, `ACM.Client.*` and `ACM.Server.*`.
    pub fn new(
        properties: &Properties,
        providers: Providers,
        connection_factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let defaults = DefaultsAndOverrides::from_properties(properties);
        let client = AcmConfig::from_properties(properties, "ACM.Client", AcmConfig::client());
        let server = AcmConfig::from_properties(properties, "ACM.Server", AcmConfig::server());
        tracing::debug!(?client, ?server, "connection monitoring configured");

        Self {
            client_acm: FactoryAcmMonitor::new(
                client,
                Arc::clone(providers.timer()),
                Arc::clone(providers.time()),
            ),
            server_acm: FactoryAcmMonitor::new(
                server,
                Arc::clone(providers.timer()),
                Arc::clone(providers.time()),
            ),
            providers,
            defaults,
            connection_factory,
            connection_cache: ConnectionCache::new(),
            locators: Mutex::new(HashMap::new()),
            routers: Mutex::new(HashMap::new()),
        }
    }

    /// Time, random and timer providers.
    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Reference defaults and forced overrides.
    pub fn defaults(&self) -> &DefaultsAndOverrides {
        &self.defaults
    }

    /// Factory used to open connections.
    pub fn connection_factory(&self) -> &Arc<dyn ConnectionFactory> {
        &self.connection_factory
    }

    /// Connections shared by equal resolutions.
    pub fn connection_cache(&self) -> &ConnectionCache {
        &self.connection_cache
    }

    /// Monitor of outgoing connections.
    pub fn client_acm(&self) -> &FactoryAcmMonitor {
        &self.client_acm
    }

    /// Monitor of incoming connections.
    pub fn server_acm(&self) -> &FactoryAcmMonitor {
        &self.server_acm
    }

    /// Builder for a reference to `identity` with this runtime's defaults.
    pub fn reference(&self, identity: Identity) -> ReferenceBuilder {
        ReferenceBuilder::with_defaults(identity, &self.defaults)
    }

    /// Locator info for the locator reachable through `proxy`.
    ///
    /// Equal proxies share one `LocatorInfo`, and with it one cache.
    pub fn locator_info(&self, proxy: Reference, locator: Arc<dyn Locator>) -> Arc<LocatorInfo> {
        let mut locators = self
            .locators
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let time = self.providers.time();
        Arc::clone(
            locators
                .entry(proxy.clone())
                .or_insert_with(|| Arc::new(LocatorInfo::new(proxy, locator, Arc::clone(time)))),
        )
    }

    /// Router info for the router reachable through `proxy`.
    ///
    /// Equal proxies share one `RouterInfo`.
    pub fn router_info(&self, proxy: Reference, router: Arc<dyn Router>) -> Arc<RouterInfo> {
        let mut routers = self
            .routers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            routers
                .entry(proxy.clone())
                .or_insert_with(|| Arc::new(RouterInfo::new(proxy, router))),
        )
    }

    /// Release every connection and stop the timer.
    ///
    /// Blocks until both monitors have let go of their connections. Must not
    /// be called from the timer thread.
    pub fn destroy(&self) {
        self.client_acm.destroy();
        self.server_acm.destroy();
        self.connection_cache.clear();
        self.locators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.routers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.providers.destroy();
        tracing::debug!("proxy runtime destroyed");
    }
}

impl std::fmt::Debug for ProxyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRuntime")
            .field("defaults", &self.defaults)
            .field("cached_connections", &self.connection_cache.len())
            .field("client_acm", &self.client_acm)
            .field("server_acm", &self.server_acm)
            .finish_non_exhaustive()
    }
}
