//! Distributed bloom-filter backend over a named remote bit array.

use super::bloom::{bit_indexes, BloomParams};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upper bound applied to any requested expiration of a remote bit array.
pub(crate) const MAX_EXPIRY: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// A remote bit-array structure addressed by name — e.g. a Redis bitmap
/// behind a connection pool. All operations are network round trips.
#[async_trait]
pub trait BitArrayClient: Send + Sync {
    /// Creates the named array sized for `bits`/`hash_iterations` if it does
    /// not exist. Returns `true` when a structure of that name already
    /// existed.
    async fn try_init(&self, name: &str, bits: u64, hash_iterations: u32)
        -> anyhow::Result<bool>;

    /// Deletes the named array.
    async fn delete(&self, name: &str) -> anyhow::Result<()>;

    /// Sets the expiration of the named array.
    async fn expire(&self, name: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Atomically reads and sets the given bit positions in one round trip.
    /// Returns `true` when every bit was already set before the call — the
    /// key was possibly present.
    async fn check_and_set(&self, name: &str, indexes: &[u64]) -> anyhow::Result<bool>;
}

/// Construction options for a distributed bloom filter.
#[derive(Debug, Clone)]
pub struct DistributedOptions {
    /// Filter sizing.
    pub params: BloomParams,
    /// Delete and re-create a pre-existing structure of the same name.
    pub clean_if_exists: bool,
    /// Requested expiration; capped at two days, defaulting to the cap.
    pub expiry: Option<Duration>,
}

impl Default for DistributedOptions {
    fn default() -> Self {
        Self {
            params: BloomParams::default(),
            clean_if_exists: false,
            expiry: None,
        }
    }
}

/// The connected remote filter: index math local, bit storage remote.
pub(crate) struct DistributedBloom {
    client: Arc<dyn BitArrayClient>,
    name: String,
    bit_len: u64,
    hash_iterations: u32,
}

impl DistributedBloom {
    pub(crate) async fn connect(
        client: Arc<dyn BitArrayClient>,
        name: String,
        options: DistributedOptions,
    ) -> anyhow::Result<Self> {
        let bit_len = options.params.bit_len();
        let hash_iterations = options.params.hash_iterations();

        let existed = client.try_init(&name, bit_len, hash_iterations).await?;
        if existed && options.clean_if_exists {
            debug!(name = %name, "clearing pre-existing bit array");
            client.delete(&name).await?;
            client.try_init(&name, bit_len, hash_iterations).await?;
        }

        let ttl = options.expiry.map_or(MAX_EXPIRY, |d| d.min(MAX_EXPIRY));
        client.expire(&name, ttl).await?;

        Ok(Self {
            client,
            name,
            bit_len,
            hash_iterations,
        })
    }

    /// Merged membership check and insertion.
    pub(crate) async fn check_and_set(&self, key: &str) -> anyhow::Result<bool> {
        let indexes = bit_indexes(key, self.bit_len, self.hash_iterations);
        self.client.check_and_set(&self.name, &indexes).await
    }

    pub(crate) async fn delete(&self) -> anyhow::Result<()> {
        self.client.delete(&self.name).await
    }
}

/// In-memory [`BitArrayClient`] for tests and single-node deployments.
///
/// Tracks write round trips and applied TTLs so callers can assert on
/// traffic shape.
#[derive(Default)]
pub struct InMemoryBitArray {
    arrays: Mutex<HashMap<String, HashSet<u64>>>,
    ttls: Mutex<HashMap<String, Duration>>,
    write_ops: AtomicU64,
}

impl InMemoryBitArray {
    /// Creates an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write round trips performed so far.
    #[must_use]
    pub fn write_ops(&self) -> u64 {
        self.write_ops.load(Ordering::SeqCst)
    }

    /// The TTL last applied to the named array.
    #[must_use]
    pub fn ttl_of(&self, name: &str) -> Option<Duration> {
        self.ttls.lock().get(name).copied()
    }

    /// Whether the named array currently exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.arrays.lock().contains_key(name)
    }
}

#[async_trait]
impl BitArrayClient for InMemoryBitArray {
    async fn try_init(
        &self,
        name: &str,
        _bits: u64,
        _hash_iterations: u32,
    ) -> anyhow::Result<bool> {
        let mut arrays = self.arrays.lock();
        let existed = arrays.contains_key(name);
        arrays.entry(name.to_string()).or_default();
        Ok(existed)
    }

    async fn delete(&self, name: &str) -> anyhow::Result<()> {
        self.arrays.lock().remove(name);
        self.ttls.lock().remove(name);
        Ok(())
    }

    async fn expire(&self, name: &str, ttl: Duration) -> anyhow::Result<()> {
        self.ttls.lock().insert(name.to_string(), ttl);
        Ok(())
    }

    async fn check_and_set(&self, name: &str, indexes: &[u64]) -> anyhow::Result<bool> {
        self.write_ops.fetch_add(1, Ordering::SeqCst);
        let mut arrays = self.arrays.lock();
        let set = arrays.entry(name.to_string()).or_default();
        let all_present = indexes.iter().all(|i| set.contains(i));
        set.extend(indexes.iter().copied());
        Ok(all_present)
    }
}
