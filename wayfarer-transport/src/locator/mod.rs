//! Indirect resolution through a locator service.
//!
//! An indirect reference names either an object adapter (`@ adapter`) or
//! only an identity (a well-known object). [`LocatorInfo`] turns either into
//! endpoints by asking a [`Locator`] collaborator, caching the answers.
//!
//! # Cache timeouts
//!
//! Each lookup passes the reference's locator cache timeout, in seconds:
//!
//! | timeout | behavior |
//! |---------|----------|
//! | `-1`    | cached answers never expire |
//! | `0`     | the cache is bypassed; every lookup asks the locator |
//! | `n > 0` | answers older than `n` seconds are refreshed |
//!
//! # Well-known objects
//!
//! 1. Find the object reference (object table, else `find_object_by_id`).
//! 2. A direct object reference yields its endpoints.
//! 3. An object reference naming an adapter is resolved through the adapter
//!    table; an empty answer evicts the object entry.
//! 4. An object reference that is itself well-known is not followed and
//!    fails with [`LocatorError::ObjectNotFound`].

mod table;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use wayfarer_core::TimeProvider;

use crate::{Endpoint, Identity, Reference};
use table::LookupTable;

/// Errors returned by locator lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    /// The locator does not know the adapter.
    #[error("object adapter `{adapter_id}` not found")]
    AdapterNotFound {
        /// The adapter id looked up.
        adapter_id: String,
    },

    /// The locator does not know the object.
    #[error("object `{identity}` not found")]
    ObjectNotFound {
        /// The identity looked up.
        identity: Identity,
    },

    /// The locator request itself failed.
    #[error("locator request failed: {message}")]
    RequestFailed {
        /// Details about the failure.
        message: String,
    },

    /// The request this lookup was waiting on was abandoned.
    #[error("locator lookup cancelled")]
    Cancelled,
}

/// Remote locator service.
#[async_trait]
pub trait Locator: Send + Sync {
    /// Reference whose endpoints serve `adapter_id`, `None` if unknown.
    async fn find_adapter_by_id(&self, adapter_id: &str) -> Result<Option<Reference>, LocatorError>;

    /// Reference to the object `identity`, `None` if unknown.
    async fn find_object_by_id(&self, identity: &Identity) -> Result<Option<Reference>, LocatorError>;
}

/// Endpoints produced by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorEndpoints {
    /// The endpoints; empty when the locator knows the target but it has none.
    pub endpoints: Vec<Endpoint>,
    /// Whether the answer came from the cache.
    pub cached: bool,
}

/// A locator plus its adapter and well-known object caches.
///
/// Two `LocatorInfo` are equal when they wrap the same locator proxy.
pub struct LocatorInfo {
    proxy: Reference,
    locator: Arc<dyn Locator>,
    time: Arc<dyn TimeProvider>,
    adapters: LookupTable<String, Vec<Endpoint>>,
    objects: LookupTable<Identity, Reference>,
}

impl LocatorInfo {
    /// Wrap `locator`, reachable through `proxy`.
    pub fn new(proxy: Reference, locator: Arc<dyn Locator>, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            proxy,
            locator,
            time,
            adapters: LookupTable::new(|endpoints: &Vec<Endpoint>| !endpoints.is_empty()),
            objects: LookupTable::new(|_| true),
        }
    }

    /// Reference of the locator object.
    pub fn proxy(&self) -> &Reference {
        &self.proxy
    }

    /// Resolve an indirect reference to endpoints.
    ///
    /// Uses the adapter id when the reference has one, the identity
    /// otherwise. `ttl` is the reference's locator cache timeout.
    pub async fn get_endpoints(
        &self,
        reference: &Reference,
        ttl: i32,
    ) -> Result<LocatorEndpoints, LocatorError> {
        if reference.adapter_id().is_empty() {
            self.object_endpoints(reference.identity(), ttl).await
        } else {
            self.adapter_endpoints(reference.adapter_id(), ttl).await
        }
    }

    /// Evict the cache entries `reference` was resolved from.
    pub fn clear_cache(&self, reference: &Reference) {
        if !reference.adapter_id().is_empty() {
            if self.adapters.remove(&reference.adapter_id().to_string()).is_some() {
                tracing::debug!(adapter_id = reference.adapter_id(), "removed adapter endpoints from locator cache");
            }
            return;
        }

        if let Some(object) = self.objects.remove(reference.identity()) {
            tracing::debug!(identity = %reference.identity(), "removed well-known object from locator cache");
            if !object.adapter_id().is_empty() {
                self.adapters.remove(&object.adapter_id().to_string());
            }
        }
    }

    /// Number of cached adapter entries.
    pub fn cached_adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Number of cached well-known object entries.
    pub fn cached_object_count(&self) -> usize {
        self.objects.len()
    }

    async fn adapter_endpoints(
        &self,
        adapter_id: &str,
        ttl: i32,
    ) -> Result<LocatorEndpoints, LocatorError> {
        let key = adapter_id.to_string();
        if let Some(endpoints) = self.adapters.cached(&key, self.time.now(), ttl) {
            tracing::trace!(adapter_id, "adapter endpoints found in locator cache");
            return Ok(LocatorEndpoints {
                endpoints,
                cached: true,
            });
        }

        let locator = &self.locator;
        let endpoints = self
            .adapters
            .lookup(key, || self.time.now(), || async move {
                tracing::debug!(adapter_id, "querying locator for adapter");
                match locator.find_adapter_by_id(adapter_id).await? {
                    Some(proxy) => Ok(proxy.endpoints().to_vec()),
                    None => Err(LocatorError::AdapterNotFound {
                        adapter_id: adapter_id.to_string(),
                    }),
                }
            })
            .await?;

        Ok(LocatorEndpoints {
            endpoints,
            cached: false,
        })
    }

    async fn object_endpoints(
        &self,
        identity: &Identity,
        ttl: i32,
    ) -> Result<LocatorEndpoints, LocatorError> {
        let (object, object_cached) = match self.objects.cached(identity, self.time.now(), ttl) {
            Some(object) => (object, true),
            None => {
                let locator = &self.locator;
                let object = self
                    .objects
                    .lookup(identity.clone(), || self.time.now(), || async move {
                        tracing::debug!(%identity, "querying locator for well-known object");
                        locator
                            .find_object_by_id(identity)
                            .await?
                            .ok_or_else(|| LocatorError::ObjectNotFound {
                                identity: identity.clone(),
                            })
                    })
                    .await?;
                (object, false)
            }
        };

        if !object.endpoints().is_empty() {
            return Ok(LocatorEndpoints {
                endpoints: object.endpoints().to_vec(),
                cached: object_cached,
            });
        }

        if !object.adapter_id().is_empty() {
            let resolved = match self.adapter_endpoints(object.adapter_id(), ttl).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    self.objects.remove(identity);
                    return Err(e);
                }
            };
            if resolved.endpoints.is_empty() {
                self.objects.remove(identity);
            }
            return Ok(LocatorEndpoints {
                endpoints: resolved.endpoints,
                cached: object_cached && resolved.cached,
            });
        }

        self.objects.remove(identity);
        Err(LocatorError::ObjectNotFound {
            identity: identity.clone(),
        })
    }

    /// Cached object reference for `identity`, regardless of age.
    pub fn cached_object(&self, identity: &Identity) -> Option<Reference> {
        self.objects.peek(identity)
    }
}

impl PartialEq for LocatorInfo {
    fn eq(&self, other: &Self) -> bool {
        self.proxy == other.proxy
    }
}

impl Eq for LocatorInfo {}

impl PartialOrd for LocatorInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocatorInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.proxy.cmp(&other.proxy)
    }
}

impl Hash for LocatorInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.proxy.hash(state);
    }
}

impl fmt::Debug for LocatorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorInfo")
            .field("proxy", &self.proxy.to_string())
            .field("cached_adapters", &self.adapters.len())
            .field("cached_objects", &self.objects.len())
            .finish()
    }
}
