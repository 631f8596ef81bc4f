//! Timestamped lookup cache with request coalescing.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::LocatorError;

type Waiter<V> = oneshot::Sender<Result<V, LocatorError>>;

struct Entry<V> {
    value: V,
    inserted: Instant,
}

struct TableState<K, V> {
    entries: HashMap<K, Entry<V>>,
    pending: HashMap<K, Vec<Waiter<V>>>,
}

/// Cache of locator answers keyed by adapter id or identity.
///
/// At most one request per key is outstanding; later callers for the same
/// key wait for the leader's answer instead of querying again.
pub(super) struct LookupTable<K, V> {
    state: Mutex<TableState<K, V>>,
    cacheable: fn(&V) -> bool,
}

/// Whether an entry inserted at `inserted` may still be used at `now`.
///
/// `ttl` is in seconds: negative never expires, zero never matches.
pub(super) fn is_fresh(inserted: Instant, now: Instant, ttl: i32) -> bool {
    match u64::try_from(ttl) {
        Err(_) => true,
        Ok(0) => false,
        Ok(seconds) => now.saturating_duration_since(inserted) <= Duration::from_secs(seconds),
    }
}

impl<K, V> LookupTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(super) fn new(cacheable: fn(&V) -> bool) -> Self {
        Self {
            state: Mutex::new(TableState {
                entries: HashMap::new(),
                pending: HashMap::new(),
            }),
            cacheable,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn cached(&self, key: &K, now: Instant, ttl: i32) -> Option<V> {
        let state = self.lock();
        let entry = state.entries.get(key)?;
        is_fresh(entry.inserted, now, ttl).then(|| entry.value.clone())
    }

    pub(super) fn peek(&self, key: &K) -> Option<V> {
        self.lock().entries.get(key).map(|entry| entry.value.clone())
    }

    pub(super) fn remove(&self, key: &K) -> Option<V> {
        self.lock().entries.remove(key).map(|entry| entry.value)
    }

    pub(super) fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Resolve `key` through `fetch`, sharing an in-flight request if any.
    ///
    /// `now` timestamps the cached answer.
    pub(super) async fn lookup<F, Fut>(
        &self,
        key: K,
        now: impl FnOnce() -> Instant,
        fetch: F,
    ) -> Result<V, LocatorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, LocatorError>>,
    {
        let follower = {
            let mut state = self.lock();
            match state.pending.get_mut(&key) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    state.pending.insert(key.clone(), Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = follower {
            return rx.await.unwrap_or(Err(LocatorError::Cancelled));
        }

        let mut guard = PendingGuard {
            table: self,
            key: Some(key),
        };
        let result = fetch().await;
        guard.complete(&result, now());
        result
    }
}

/// Clears the pending slot of a leader, even if its future is dropped.
///
/// Dropping the waiters' senders wakes followers with
/// [`LocatorError::Cancelled`].
struct PendingGuard<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    table: &'a LookupTable<K, V>,
    key: Option<K>,
}

impl<K, V> PendingGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn complete(&mut self, result: &Result<V, LocatorError>, now: Instant) {
        let Some(key) = self.key.take() else {
            return;
        };

        let waiters = {
            let mut state = self.table.lock();
            let waiters = state.pending.remove(&key).unwrap_or_default();
            if let Ok(value) = result {
                if (self.table.cacheable)(value) {
                    state.entries.insert(
                        key,
                        Entry {
                            value: value.clone(),
                            inserted: now,
                        },
                    );
                }
            }
            waiters
        };

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl<K, V> Drop for PendingGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.table.lock().pending.remove(&key);
        }
    }
}
