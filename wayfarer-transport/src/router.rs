//! Resolution through a router.
//!
//! A routed reference sends its requests to the router's client proxy
//! instead of its own endpoints. [`RouterInfo`] fetches that proxy and the
//! router's server endpoints once and keeps them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::{Endpoint, Reference};

/// Errors returned by router queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The router request failed.
    #[error("router request failed: {message}")]
    RequestFailed {
        /// Details about the failure.
        message: String,
    },

    /// The router has no server proxy.
    #[error("router has no server proxy")]
    NoServerProxy,
}

/// Remote router service.
#[async_trait]
pub trait Router: Send + Sync {
    /// Proxy clients send routed requests to, if the router has one.
    async fn get_client_proxy(&self) -> Result<Option<Reference>, RouterError>;

    /// Proxy the router forwards callbacks from.
    async fn get_server_proxy(&self) -> Result<Option<Reference>, RouterError>;
}

/// A router plus its cached client proxy and server endpoints.
///
/// Two `RouterInfo` are equal when they wrap the same router proxy.
pub struct RouterInfo {
    proxy: Reference,
    router: Arc<dyn Router>,
    client_proxy: OnceCell<Option<Reference>>,
    server_endpoints: OnceCell<Vec<Endpoint>>,
}

impl RouterInfo {
    /// Wrap `router`, reachable through `proxy`.
    pub fn new(proxy: Reference, router: Arc<dyn Router>) -> Self {
        Self {
            proxy,
            router,
            client_proxy: OnceCell::new(),
            server_endpoints: OnceCell::new(),
        }
    }

    /// Reference of the router object.
    pub fn proxy(&self) -> &Reference {
        &self.proxy
    }

    /// Client proxy of the router, without a router of its own.
    ///
    /// Fetched on first use; concurrent first callers share one request and
    /// a failed request is retried by the next caller.
    pub async fn get_client_proxy(&self) -> Result<Option<Reference>, RouterError> {
        self.client_proxy
            .get_or_try_init(|| async {
                let proxy = self.router.get_client_proxy().await?;
                tracing::debug!(
                    router = %self.proxy,
                    client = ?proxy.as_ref().map(ToString::to_string),
                    "fetched router client proxy"
                );
                Ok::<_, RouterError>(proxy.map(|proxy| proxy.change_router(None).unwrap_or(proxy)))
            })
            .await
            .cloned()
    }

    /// Endpoints of the router's server proxy.
    pub async fn get_server_endpoints(&self) -> Result<Vec<Endpoint>, RouterError> {
        self.server_endpoints
            .get_or_try_init(|| async {
                let proxy = self
                    .router
                    .get_server_proxy()
                    .await?
                    .ok_or(RouterError::NoServerProxy)?;
                Ok::<_, RouterError>(proxy.endpoints().to_vec())
            })
            .await
            .cloned()
    }
}

impl PartialEq for RouterInfo {
    fn eq(&self, other: &Self) -> bool {
        self.proxy == other.proxy
    }
}

impl Eq for RouterInfo {}

impl PartialOrd for RouterInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RouterInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.proxy.cmp(&other.proxy)
    }
}

impl Hash for RouterInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.proxy.hash(state);
    }
}

impl fmt::Debug for RouterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterInfo")
            .field("proxy", &self.proxy.to_string())
            .field("client_proxy_cached", &self.client_proxy.initialized())
            .finish()
    }
}
