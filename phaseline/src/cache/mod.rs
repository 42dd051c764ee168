//! Environment-aware caches: long-lived, purpose-tagged stores shared by
//! every context of a pipeline family.
//!
//! These caches hold environment resources — client handles, lock managers,
//! judge state — not per-run data. The map of caches is created once, owned
//! by the engine root, and handed to each context at `start`; it is never
//! deep-copied with the context.

mod bounded;
mod map;

pub use bounded::BoundedAwareCache;
pub use map::MapAwareCache;

use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Cached values are shared handles to arbitrary environment resources.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// The closed set of cache purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Messaging-client handles (producers, consumers) per environment.
    Messaging,
    /// Remote-lock-client handles per environment.
    RemoteLock,
    /// Idempotency-judge state.
    IdempotentJudge,
    /// Execution-unit details, retained past chain termination.
    ExecutionUnit,
}

/// A purpose-tagged key/value store shared across contexts.
///
/// Each instance is its own unit of mutual exclusion; there are no
/// cross-cache transactions.
pub trait AwareCache: Send + Sync {
    /// The purpose this cache serves.
    fn kind(&self) -> CacheKind;

    /// Stores a value.
    fn put(&self, key: &str, value: CacheValue);

    /// Fetches a value.
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Removes a value.
    fn remove(&self, key: &str);

    /// Housekeeping pass, invoked at chain termination.
    fn clean(&self) {}
}

/// The process-wide kind → cache map.
#[derive(Default)]
pub struct AwareCacheMap {
    inner: DashMap<CacheKind, Arc<dyn AwareCache>>,
}

impl AwareCacheMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cache under its own kind, replacing any previous one.
    pub fn insert(&self, cache: Arc<dyn AwareCache>) {
        self.inner.insert(cache.kind(), cache);
    }

    /// Looks up the cache for a purpose.
    #[must_use]
    pub fn get(&self, kind: CacheKind) -> Option<Arc<dyn AwareCache>> {
        self.inner.get(&kind).map(|entry| Arc::clone(entry.value()))
    }

    /// Runs every cache's housekeeping pass.
    pub fn clean_all(&self) {
        for entry in &self.inner {
            entry.value().clean();
        }
    }

    /// Number of registered caches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no cache is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for AwareCacheMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<CacheKind> = self.inner.iter().map(|e| *e.key()).collect();
        f.debug_struct("AwareCacheMap").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_is_keyed_by_cache_kind() {
        let map = AwareCacheMap::new();
        assert!(map.is_empty());

        map.insert(Arc::new(MapAwareCache::new(CacheKind::Messaging)));
        map.insert(Arc::new(MapAwareCache::new(CacheKind::RemoteLock)));

        assert_eq!(map.len(), 2);
        assert!(map.get(CacheKind::Messaging).is_some());
        assert!(map.get(CacheKind::ExecutionUnit).is_none());
    }

    #[test]
    fn insert_replaces_same_kind() {
        let map = AwareCacheMap::new();
        let first = Arc::new(MapAwareCache::new(CacheKind::Messaging));
        first.put("env", Arc::new("old".to_string()));
        map.insert(first);
        map.insert(Arc::new(MapAwareCache::new(CacheKind::Messaging)));

        let cache = map.get(CacheKind::Messaging).unwrap();
        assert!(cache.get("env").is_none());
    }
}
