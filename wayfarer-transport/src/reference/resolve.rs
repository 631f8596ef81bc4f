//! Turning a reference into a connection.
//!
//! ```text
//! fixed ───────────────────────────────────────────────► bound connection
//! routable ─► router? ─► client proxy ─► (resolve that instead)
//!          └► endpoints | locator(adapter id | identity)
//!               ─► overrides ─► filter/order ─► cache? ─► connect in order
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{Reference, ReferenceKind, RoutableTarget};
use crate::{
    filter_endpoints, AcmMonitor, CacheLookup, Connection, ConnectionKey, Endpoint,
    ProxyRuntime, ResolutionError,
};

/// Future returned by [`Reference::get_connection`].
pub type ConnectionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<dyn Connection>, ResolutionError>> + Send + 'a>>;

impl Reference {
    /// Obtain a connection for invocations through this reference.
    ///
    /// Reuses a cached connection when allowed; otherwise connects to each
    /// candidate endpoint in order and registers the first success with the
    /// client connection monitor. A cached connection found unusable is
    /// dropped from the cache and from the monitor. Never retries: a failure is returned to
    /// the caller, with stale locator entries evicted first.
    pub fn get_connection<'a>(&'a self, runtime: &'a ProxyRuntime) -> ConnectionFuture<'a> {
        Box::pin(async move {
            match &self.inner.kind {
                ReferenceKind::Fixed(connection) => self.fixed_connection(connection, runtime),
                ReferenceKind::Routable(target) => self.routable_connection(target, runtime).await,
            }
        })
    }

    fn fixed_connection(
        &self,
        connection: &Arc<dyn Connection>,
        runtime: &ProxyRuntime,
    ) -> Result<Arc<dyn Connection>, ResolutionError> {
        if !connection.is_usable() {
            return Err(ResolutionError::ConnectionLost {
                proxy: self.to_string(),
            });
        }

        let secure = runtime
            .defaults()
            .override_secure
            .unwrap_or(self.inner.secure);
        if secure && !connection.endpoint().is_secure() {
            tracing::debug!(proxy = %self, endpoint = %connection.endpoint(), "fixed connection is not secure");
            return Err(ResolutionError::NoEndpoint {
                proxy: self.to_string(),
                last_error: None,
            });
        }
        Ok(Arc::clone(connection))
    }

    async fn routable_connection(
        &self,
        target: &RoutableTarget,
        runtime: &ProxyRuntime,
    ) -> Result<Arc<dyn Connection>, ResolutionError> {
        if let Some(router) = &target.router_info {
            if let Some(client) = router.get_client_proxy().await? {
                tracing::debug!(proxy = %self, client = %client, "resolving through router client proxy");
                return client.get_connection(runtime).await;
            }
        }

        let (endpoints, from_cache) = self.resolve_endpoints(target).await?;

        let defaults = runtime.defaults();
        let timeout = defaults.override_timeout.or(target.timeout);
        let compress = defaults.override_compress.or(self.inner.compress);
        let secure = defaults.override_secure.unwrap_or(self.inner.secure);
        let endpoints = apply_overrides(endpoints, &target.connection_id, timeout, compress);

        let candidates = filter_endpoints(
            &endpoints,
            self.inner.mode,
            secure,
            target.prefer_secure,
            target.endpoint_selection,
            runtime.providers().random().as_ref(),
        );
        if candidates.is_empty() {
            tracing::debug!(proxy = %self, resolved = endpoints.len(), "no endpoint usable for invocation mode");
            self.evict_locator_entries(target, from_cache);
            return Err(ResolutionError::NoEndpoint {
                proxy: self.to_string(),
                last_error: None,
            });
        }

        let key = ConnectionKey::new(&candidates, timeout, compress, target.connection_id.as_str());
        if target.cache_connection {
            match runtime.connection_cache().get(&key) {
                CacheLookup::Hit(connection) => {
                    tracing::trace!(proxy = %self, endpoint = %connection.endpoint(), "reusing cached connection");
                    return Ok(connection);
                }
                CacheLookup::Evicted(stale) => runtime.client_acm().remove(&stale),
                CacheLookup::Miss => {}
            }
        }

        let mut last_error = None;
        for endpoint in &candidates {
            match runtime.connection_factory().connect(endpoint).await {
                Ok(connection) => {
                    tracing::debug!(proxy = %self, %endpoint, "connection established");
                    return Ok(self.register_connection(connection, key, target, runtime));
                }
                Err(e) => {
                    tracing::debug!(proxy = %self, %endpoint, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
            }
        }

        self.evict_locator_entries(target, from_cache);
        Err(ResolutionError::NoEndpoint {
            proxy: self.to_string(),
            last_error,
        })
    }

    /// Cache and monitor a freshly established connection.
    ///
    /// When a concurrent resolution cached a usable connection under the
    /// same key first, that one is returned and `connection` is dropped
    /// without ever being monitored.
    fn register_connection(
        &self,
        connection: Arc<dyn Connection>,
        key: ConnectionKey,
        target: &RoutableTarget,
        runtime: &ProxyRuntime,
    ) -> Arc<dyn Connection> {
        let acm = runtime.client_acm();
        if target.cache_connection {
            let (cached, replaced) = runtime
                .connection_cache()
                .insert_if_absent(key, Arc::clone(&connection));
            if let Some(stale) = replaced {
                acm.remove(&stale);
            }
            if !Arc::ptr_eq(&cached, &connection) {
                tracing::debug!(proxy = %self, endpoint = %cached.endpoint(), "concurrent resolution cached a connection first");
                return cached;
            }
        }

        connection.set_monitor(Arc::new(acm.clone()));
        acm.add(Arc::clone(&connection));
        connection
    }

    /// Endpoints of the target, and whether they came from the locator cache.
    async fn resolve_endpoints(
        &self,
        target: &RoutableTarget,
    ) -> Result<(Vec<Endpoint>, bool), ResolutionError> {
        if !target.endpoints.is_empty() {
            return Ok((target.endpoints.clone(), false));
        }

        let Some(locator) = &target.locator_info else {
            tracing::debug!(proxy = %self, "indirect proxy without locator");
            return Err(ResolutionError::NoEndpoint {
                proxy: self.to_string(),
                last_error: None,
            });
        };

        let resolved = locator
            .get_endpoints(self, target.locator_cache_timeout)
            .await?;
        Ok((resolved.endpoints, resolved.cached))
    }

    fn evict_locator_entries(&self, target: &RoutableTarget, from_cache: bool) {
        if !from_cache {
            return;
        }
        if let Some(locator) = &target.locator_info {
            locator.clear_cache(self);
        }
    }
}

/// Stamp per-reference and forced settings onto resolved endpoints.
fn apply_overrides(
    endpoints: Vec<Endpoint>,
    connection_id: &str,
    timeout: Option<i32>,
    compress: Option<bool>,
) -> Vec<Endpoint> {
    endpoints
        .into_iter()
        .map(|mut endpoint| {
            endpoint.connection_id = connection_id.to_string();
            if let Some(timeout) = timeout {
                endpoint.timeout = timeout;
            }
            if let Some(compress) = compress {
                endpoint.compress = compress;
            }
            endpoint
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overrides() {
        let endpoints = vec![
            Endpoint::tcp("a", 1).with_compress(true),
            Endpoint::tcp("b", 2),
        ];

        let stamped = apply_overrides(endpoints.clone(), "pool", Some(250), None);
        assert!(stamped.iter().all(|e| e.connection_id == "pool" && e.timeout == 250));
        assert!(stamped[0].compress);
        assert!(!stamped[1].compress);

        let uncompressed = apply_overrides(endpoints, "", None, Some(false));
        assert!(uncompressed.iter().all(|e| !e.compress));
        assert!(uncompressed
            .iter()
            .all(|e| e.timeout == crate::DEFAULT_ENDPOINT_TIMEOUT_MS));
    }
}
