//! Bounded aware cache with write-based expiry and emulated sliding
//! expiration.

use super::{AwareCache, CacheKind, CacheValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const DEFAULT_MAX_ENTRIES: usize = 500_000;
const DEFAULT_TTL: Duration = Duration::from_secs(600);

struct Entry {
    value: CacheValue,
    written_at: Instant,
}

/// A size-bounded cache whose entries expire a fixed interval after their
/// last write.
///
/// Write-based expiry does not slide on read, so with access renewal
/// enabled (the default) every successful `get` re-inserts the entry,
/// resetting its expiry clock — emulating sliding expiration on top of a
/// write-expiring store. `clean` purges expired entries, except in
/// retaining mode where entries must outlive chain termination and expiry
/// alone reclaims them.
pub struct BoundedAwareCache {
    kind: CacheKind,
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    max_entries: usize,
    access_renewal: bool,
    retain_on_clean: bool,
}

impl BoundedAwareCache {
    /// Default configuration: 500 000 entries, 600 s write expiry, access
    /// renewal enabled.
    #[must_use]
    pub fn new(kind: CacheKind) -> Self {
        Self::with_config(kind, DEFAULT_TTL, DEFAULT_MAX_ENTRIES, true)
    }

    /// Explicit configuration.
    #[must_use]
    pub fn with_config(
        kind: CacheKind,
        ttl: Duration,
        max_entries: usize,
        access_renewal: bool,
    ) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            access_renewal,
            retain_on_clean: false,
        }
    }

    /// Keeps `clean` a no-op so entries survive chain termination; only
    /// write expiry reclaims them.
    #[must_use]
    pub fn retaining(mut self) -> Self {
        self.retain_on_clean = true;
        self
    }

    /// Number of live (possibly expired, not yet reclaimed) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.written_at) >= self.ttl
    }

    fn purge_expired(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, entry| !self.is_expired(entry, now));
    }
}

impl AwareCache for BoundedAwareCache {
    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn put(&self, key: &str, value: CacheValue) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            self.purge_expired(&mut entries, now);
            if entries.len() >= self.max_entries {
                // still full: reclaim the stalest write
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.written_at)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    entries.remove(&k);
                }
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                value,
                written_at: now,
            },
        );
    }

    fn get(&self, key: &str) -> Option<CacheValue> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = self.is_expired(entries.get(key)?, now);
        if expired {
            entries.remove(key);
            return None;
        }

        let entry = entries.get_mut(key)?;
        if self.access_renewal {
            // re-insert with a fresh write stamp to slide the expiry
            entry.written_at = now;
        }
        Some(entry.value.clone())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn clean(&self) {
        if self.retain_on_clean {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.purge_expired(&mut entries, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::sleep;

    fn value(s: &str) -> CacheValue {
        Arc::new(s.to_string())
    }

    #[test]
    fn entries_expire_on_schedule_without_access() {
        let cache = BoundedAwareCache::with_config(
            CacheKind::ExecutionUnit,
            Duration::from_millis(60),
            16,
            true,
        );
        cache.put("unit", value("details"));

        sleep(Duration::from_millis(90));
        assert!(cache.get("unit").is_none());
    }

    #[test]
    fn access_renewal_slides_the_expiry_window() {
        let cache = BoundedAwareCache::with_config(
            CacheKind::ExecutionUnit,
            Duration::from_millis(100),
            16,
            true,
        );
        cache.put("unit", value("details"));

        // touch just before expiry; the read resets the clock
        sleep(Duration::from_millis(60));
        assert!(cache.get("unit").is_some());

        // past the original window, inside the renewed one
        sleep(Duration::from_millis(60));
        assert!(cache.get("unit").is_some());
    }

    #[test]
    fn without_renewal_reads_do_not_slide() {
        let cache = BoundedAwareCache::with_config(
            CacheKind::ExecutionUnit,
            Duration::from_millis(100),
            16,
            false,
        );
        cache.put("unit", value("details"));

        sleep(Duration::from_millis(60));
        assert!(cache.get("unit").is_some());

        sleep(Duration::from_millis(60));
        assert!(cache.get("unit").is_none());
    }

    #[test]
    fn full_cache_evicts_stalest_write() {
        let cache = BoundedAwareCache::with_config(
            CacheKind::Messaging,
            Duration::from_secs(600),
            2,
            false,
        );
        cache.put("a", value("1"));
        sleep(Duration::from_millis(5));
        cache.put("b", value("2"));
        sleep(Duration::from_millis(5));
        cache.put("c", value("3"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn clean_purges_expired_entries() {
        let cache = BoundedAwareCache::with_config(
            CacheKind::Messaging,
            Duration::from_millis(40),
            16,
            true,
        );
        cache.put("gone", value("1"));
        sleep(Duration::from_millis(60));
        cache.put("kept", value("2"));

        cache.clean();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn retaining_mode_keeps_unexpired_entries_on_clean() {
        let cache = BoundedAwareCache::with_config(
            CacheKind::ExecutionUnit,
            Duration::from_secs(600),
            16,
            true,
        )
        .retaining();
        cache.put("unit", value("details"));

        cache.clean();
        assert!(cache.get("unit").is_some());
    }
}
