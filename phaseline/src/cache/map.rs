//! Unbounded aware cache for process-lifetime singletons.

use super::{AwareCache, CacheKind, CacheValue};
use dashmap::DashMap;

/// An unbounded concurrent map with no eviction.
///
/// Intended for per-environment singletons such as a messaging client
/// handle: a handful of keys that live as long as the process.
pub struct MapAwareCache {
    kind: CacheKind,
    entries: DashMap<String, CacheValue>,
}

impl MapAwareCache {
    /// Creates an empty cache for the given purpose.
    #[must_use]
    pub fn new(kind: CacheKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AwareCache for MapAwareCache {
    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn put(&self, key: &str, value: CacheValue) {
        self.entries.insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<CacheValue> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
