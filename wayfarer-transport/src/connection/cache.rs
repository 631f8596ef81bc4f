//! Connection cache shared by all references of a runtime.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::Connection;
use crate::Endpoint;

/// Key under which a resolved connection is cached.
///
/// Two resolutions share a connection only when they produce the same
/// candidate set with the same overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    endpoints: Vec<Endpoint>,
    timeout: Option<i32>,
    compress: Option<bool>,
    connection_id: String,
}

impl ConnectionKey {
    /// Build a key; endpoint order does not matter.
    pub fn new(
        endpoints: &[Endpoint],
        timeout: Option<i32>,
        compress: Option<bool>,
        connection_id: impl Into<String>,
    ) -> Self {
        let mut endpoints = endpoints.to_vec();
        endpoints.sort();
        endpoints.dedup();
        Self {
            endpoints,
            timeout,
            compress,
            connection_id: connection_id.into(),
        }
    }

    /// Endpoint set of the key, sorted.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Result of a [`ConnectionCache::get`] lookup.
#[derive(Debug)]
pub enum CacheLookup {
    /// A usable connection is cached under the key.
    Hit(Arc<dyn Connection>),
    /// The cached connection was no longer usable and has been dropped.
    Evicted(Arc<dyn Connection>),
    /// Nothing is cached under the key.
    Miss,
}

/// Concurrent map from [`ConnectionKey`] to an established connection.
#[derive(Debug, Default)]
pub struct ConnectionCache {
    entries: DashMap<ConnectionKey, Arc<dyn Connection>>,
}

impl ConnectionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection cached under `key`.
    ///
    /// An entry whose connection is no longer usable is dropped and handed
    /// back so the caller can stop monitoring it.
    pub fn get(&self, key: &ConnectionKey) -> CacheLookup {
        let Some(connection) = self.entries.get(key).map(|entry| Arc::clone(entry.value())) else {
            return CacheLookup::Miss;
        };
        if connection.is_usable() {
            return CacheLookup::Hit(connection);
        }

        tracing::debug!(endpoint = %connection.endpoint(), "dropping unusable cached connection");
        match self
            .entries
            .remove_if(key, |_, cached| Arc::ptr_eq(cached, &connection))
        {
            Some((_, stale)) => CacheLookup::Evicted(stale),
            None => CacheLookup::Miss,
        }
    }

    /// Cache `connection` under `key`, replacing any previous entry.
    pub fn insert(&self, key: ConnectionKey, connection: Arc<dyn Connection>) {
        self.entries.insert(key, connection);
    }

    /// Cache `connection` under `key` unless a usable connection is already
    /// cached there.
    ///
    /// Returns the connection cached under `key` afterwards, and the
    /// unusable connection it replaced, if any.
    pub fn insert_if_absent(
        &self,
        key: ConnectionKey,
        connection: Arc<dyn Connection>,
    ) -> (Arc<dyn Connection>, Option<Arc<dyn Connection>>) {
        match self.entries.entry(key) {
            Entry::Occupied(entry) if entry.get().is_usable() => (Arc::clone(entry.get()), None),
            Entry::Occupied(mut entry) => {
                let stale = entry.insert(Arc::clone(&connection));
                (connection, Some(stale))
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&connection));
                (connection, None)
            }
        }
    }

    /// Remove the entry for `key`.
    pub fn remove(&self, key: &ConnectionKey) -> Option<Arc<dyn Connection>> {
        self.entries.remove(key).map(|(_, connection)| connection)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
