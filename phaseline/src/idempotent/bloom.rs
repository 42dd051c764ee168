//! Bloom-filter idempotent judgment.
//!
//! A bloom filter answers "possibly present" or "definitely absent". The
//! absent answer is authoritative; the possibly-present answer is resolved
//! by an optional [`PreciseVerifier`] — with none configured, a possible
//! positive is treated as confirmed, accepting the false-positive risk.

use super::distributed::DistributedBloom;
use super::{
    judge_layered, put_layered, BitArrayClient, DistributedOptions, IdempotentJudge,
    PrecedingJudge, PreciseVerifier,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

/// Sizing of a bloom filter: expected insertions and target false-positive
/// probability.
#[derive(Debug, Clone, Copy)]
pub struct BloomParams {
    /// Expected number of distinct keys inserted over the structure's life.
    pub expected_insertions: usize,
    /// Target false-positive probability.
    pub fpp: f64,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            expected_insertions: 50_000,
            fpp: 0.000_01,
        }
    }
}

impl BloomParams {
    /// Optimal bit-array length: `m = -n * ln(p) / ln(2)^2`.
    #[must_use]
    pub fn bit_len(&self) -> u64 {
        let n = self.expected_insertions.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let m = (-(n * self.fpp.ln()) / (ln2 * ln2)).ceil();
        (m as u64).max(64)
    }

    /// Optimal hash-function count: `k = m / n * ln(2)`.
    #[must_use]
    pub fn hash_iterations(&self) -> u32 {
        let n = self.expected_insertions.max(1) as f64;
        let m = self.bit_len() as f64;
        let k = (m / n * std::f64::consts::LN_2).round();
        (k as u32).max(1)
    }
}

/// Bit positions for a key, by double hashing over its SHA-256 digest:
/// `g_i = h1 + i * h2 (mod m)`.
pub(crate) fn bit_indexes(key: &str, bit_len: u64, hash_iterations: u32) -> Vec<u64> {
    let digest = Sha256::digest(key.as_bytes());
    let mut h1_bytes = [0u8; 8];
    let mut h2_bytes = [0u8; 8];
    h1_bytes.copy_from_slice(&digest[0..8]);
    h2_bytes.copy_from_slice(&digest[8..16]);
    let h1 = u64::from_be_bytes(h1_bytes);
    let h2 = u64::from_be_bytes(h2_bytes);

    (0..u64::from(hash_iterations))
        .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % bit_len)
        .collect()
}

/// The in-process bit set.
#[derive(Debug)]
struct BloomBits {
    words: Vec<u64>,
    bit_len: u64,
    hash_iterations: u32,
}

impl BloomBits {
    fn new(params: BloomParams) -> Self {
        let bit_len = params.bit_len();
        let words = vec![0u64; usize::try_from(bit_len / 64 + 1).unwrap_or(1)];
        Self {
            words,
            bit_len,
            hash_iterations: params.hash_iterations(),
        }
    }

    fn get(&self, index: u64) -> bool {
        let word = (index / 64) as usize;
        let bit = index % 64;
        self.words.get(word).is_some_and(|w| w & (1 << bit) != 0)
    }

    fn set(&mut self, index: u64) {
        let word = (index / 64) as usize;
        let bit = index % 64;
        if let Some(w) = self.words.get_mut(word) {
            *w |= 1 << bit;
        }
    }

    fn might_contain(&self, key: &str) -> bool {
        bit_indexes(key, self.bit_len, self.hash_iterations)
            .into_iter()
            .all(|i| self.get(i))
    }

    fn insert(&mut self, key: &str) {
        for i in bit_indexes(key, self.bit_len, self.hash_iterations) {
            self.set(i);
        }
    }
}

enum Backend {
    Local(RwLock<Option<BloomBits>>),
    Distributed(DistributedBloom),
}

/// Bloom-filter idempotent judge with a local or a distributed backend.
///
/// The local backend is an in-process probabilistic set; the distributed
/// backend addresses a named remote bit array through [`BitArrayClient`]
/// and merges membership check and insertion into one atomic round trip.
pub struct BloomFilterJudge {
    backend: Backend,
    verifier: Option<Arc<dyn PreciseVerifier>>,
}

impl BloomFilterJudge {
    /// A local filter with default sizing (50 000 insertions, fpp 1e-5).
    #[must_use]
    pub fn local() -> Self {
        Self::local_with(BloomParams::default())
    }

    /// A local filter with explicit sizing.
    #[must_use]
    pub fn local_with(params: BloomParams) -> Self {
        Self {
            backend: Backend::Local(RwLock::new(Some(BloomBits::new(params)))),
            verifier: None,
        }
    }

    /// A distributed filter over the named remote bit array.
    ///
    /// Initializes the remote structure with the configured sizing,
    /// optionally clearing a pre-existing structure of the same name, and
    /// caps the expiration at two days regardless of the request.
    pub async fn distributed(
        client: Arc<dyn BitArrayClient>,
        name: impl Into<String>,
        options: DistributedOptions,
    ) -> anyhow::Result<Self> {
        let remote = DistributedBloom::connect(client, name.into(), options).await?;
        Ok(Self {
            backend: Backend::Distributed(remote),
            verifier: None,
        })
    }

    /// Installs a precise-verification hook for possibly-present answers.
    #[must_use]
    pub fn with_precise_verifier(mut self, verifier: Arc<dyn PreciseVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }
}

#[async_trait]
impl PrecedingJudge for BloomFilterJudge {
    async fn do_judge(&self, key: &str) -> bool {
        let possibly_present = match &self.backend {
            Backend::Local(bits) => {
                let guard = bits.read();
                guard.as_ref().is_some_and(|b| b.might_contain(key))
            }
            Backend::Distributed(remote) => match remote.check_and_set(key).await {
                Ok(present) => present,
                Err(e) => {
                    warn!(error = %e, key, "bit-array check failed; treating key as unseen");
                    false
                }
            },
        };

        if !possibly_present {
            // "definitely absent" is authoritative
            return false;
        }

        match &self.verifier {
            Some(verifier) => verifier.verify(key).await,
            // Accept the false-positive risk unless a verifier is installed.
            None => true,
        }
    }

    async fn do_put(&self, key: &str) {
        match &self.backend {
            Backend::Local(bits) => {
                let mut guard = bits.write();
                if let Some(b) = guard.as_mut() {
                    b.insert(key);
                }
            }
            // Insertion already happened during the merged check round trip.
            Backend::Distributed(_) => {}
        }
    }

    async fn do_destroy(&self) {
        match &self.backend {
            Backend::Local(bits) => {
                let mut guard = bits.write();
                *guard = None;
            }
            Backend::Distributed(remote) => {
                if let Err(e) = remote.delete().await {
                    tracing::error!(error = %e, "failed to delete remote bit array");
                }
            }
        }
    }
}

#[async_trait]
impl IdempotentJudge for BloomFilterJudge {
    async fn judge(&self, key: &str) -> bool {
        judge_layered(self, key).await
    }

    async fn put(&self, key: &str) {
        put_layered(self, key).await
    }

    async fn destroy(&self) {
        PrecedingJudge::do_destroy(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::IdempotentJudge;
    use super::*;

    #[test]
    fn sizing_math_is_sane() {
        let params = BloomParams::default();
        assert!(params.bit_len() > params.expected_insertions as u64);
        assert!(params.hash_iterations() >= 1);

        let tiny = BloomParams {
            expected_insertions: 0,
            fpp: 0.01,
        };
        assert!(tiny.bit_len() >= 64);
    }

    #[test]
    fn indexes_are_stable_and_bounded() {
        let a = bit_indexes("task-1", 1024, 7);
        let b = bit_indexes("task-1", 1024, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 7);
        assert!(a.iter().all(|&i| i < 1024));
    }

    #[tokio::test]
    async fn unseen_key_judges_false() {
        let judge = BloomFilterJudge::local();
        assert!(!judge.judge("never-put").await);
    }

    #[tokio::test]
    async fn put_then_judge_true() {
        let judge = BloomFilterJudge::local();
        judge.put("task-9").await;
        assert!(judge.judge("task-9").await);
        // unrelated keys stay absent
        assert!(!judge.judge("task-10").await);
    }

    #[tokio::test]
    async fn empty_key_is_false_even_after_put() {
        let judge = BloomFilterJudge::local();
        judge.put("").await;
        assert!(!judge.judge("").await);
    }

    #[tokio::test]
    async fn destroy_drops_the_structure() {
        let judge = BloomFilterJudge::local();
        judge.put("task-9").await;
        judge.destroy().await;
        assert!(!judge.judge("task-9").await);
    }

    #[tokio::test]
    async fn verifier_overrides_possible_positive() {
        struct Reject;

        #[async_trait]
        impl PreciseVerifier for Reject {
            async fn verify(&self, _key: &str) -> bool {
                false
            }
        }

        let judge = BloomFilterJudge::local().with_precise_verifier(Arc::new(Reject));
        judge.put("task-9").await;
        assert!(!judge.judge("task-9").await);
    }
}
