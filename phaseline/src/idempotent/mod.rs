//! Idempotency judgment: duplicate detection for re-delivered work.
//!
//! A context that exposes an idempotent key opts into judgment; the engine
//! asks the highest-priority judge present whether the keyed task already
//! ran, and registers the key as seen before executing it.

mod bloom;
mod distributed;

pub use bloom::{BloomFilterJudge, BloomParams};
pub use distributed::{BitArrayClient, DistributedOptions, InMemoryBitArray};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Membership test over a duplicate-detection set.
///
/// `judge` returning `true` means the keyed task has already executed and
/// the phase is skipped; `false` means it has not, and the engine calls
/// `put` to register the key before executing.
#[async_trait]
pub trait IdempotentJudge: Send + Sync {
    /// Whether the keyed task already ran. An empty key is never a duplicate.
    async fn judge(&self, key: &str) -> bool;

    /// Registers the key as seen.
    async fn put(&self, key: &str);

    /// Drops the underlying duplicate-detection structure.
    async fn destroy(&self);
}

/// Layered judgment: a cheap pre-check ahead of the main membership test.
///
/// Wrap an implementation in [`LayeredJudge`] to use it where an
/// [`IdempotentJudge`] is expected; the wrapper adds the empty-key rule and
/// the pre-judgment short-circuit.
#[async_trait]
pub trait PrecedingJudge: Send + Sync {
    /// Short-circuit: `true` means "definitely already executed" without
    /// consulting the main structure.
    async fn pre_judge(&self, _key: &str) -> bool {
        false
    }

    /// The main membership test.
    async fn do_judge(&self, key: &str) -> bool;

    /// The main insertion.
    async fn do_put(&self, key: &str);

    /// Drops the underlying structure.
    async fn do_destroy(&self);
}

pub(crate) async fn judge_layered<T: PrecedingJudge + ?Sized>(inner: &T, key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    if inner.pre_judge(key).await {
        return true;
    }
    inner.do_judge(key).await
}

pub(crate) async fn put_layered<T: PrecedingJudge + ?Sized>(inner: &T, key: &str) {
    if !key.is_empty() {
        inner.do_put(key).await;
    }
}

/// Adapts a [`PrecedingJudge`] into an [`IdempotentJudge`].
pub struct LayeredJudge<T>(pub T);

#[async_trait]
impl<T: PrecedingJudge> IdempotentJudge for LayeredJudge<T> {
    async fn judge(&self, key: &str) -> bool {
        judge_layered(&self.0, key).await
    }

    async fn put(&self, key: &str) {
        put_layered(&self.0, key).await
    }

    async fn destroy(&self) {
        self.0.do_destroy().await;
    }
}

/// Resolves a "possibly present" probabilistic answer into a verdict,
/// usually by querying an authoritative store.
#[async_trait]
pub trait PreciseVerifier: Send + Sync {
    /// `true` confirms the keyed task already executed.
    async fn verify(&self, key: &str) -> bool;
}

/// Builds a deterministic idempotent key from logical-task components.
#[must_use]
pub fn digest_key(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(components.join(":").as_bytes());
    let digest = hasher.finalize();
    format!("idem:{}", hex::encode(&digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedJudge {
        answer: bool,
        pre_calls: AtomicUsize,
        main_calls: AtomicUsize,
    }

    impl FixedJudge {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                pre_calls: AtomicUsize::new(0),
                main_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PrecedingJudge for FixedJudge {
        async fn pre_judge(&self, _key: &str) -> bool {
            self.pre_calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }

        async fn do_judge(&self, _key: &str) -> bool {
            self.main_calls.fetch_add(1, Ordering::SeqCst);
            false
        }

        async fn do_put(&self, _key: &str) {}

        async fn do_destroy(&self) {}
    }

    #[tokio::test]
    async fn empty_key_is_never_a_duplicate() {
        let judge = LayeredJudge(FixedJudge::new(true));
        assert!(!judge.judge("").await);
        assert_eq!(judge.0.pre_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pre_judge_short_circuits_main_test() {
        let judge = LayeredJudge(FixedJudge::new(true));
        assert!(judge.judge("task-1").await);
        assert_eq!(judge.0.main_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pre_judge_false_falls_through() {
        let judge = LayeredJudge(FixedJudge::new(false));
        assert!(!judge.judge("task-1").await);
        assert_eq!(judge.0.main_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn digest_key_is_deterministic() {
        let a = digest_key(&["tenant", "42", "send-report"]);
        let b = digest_key(&["tenant", "42", "send-report"]);
        let c = digest_key(&["tenant", "43", "send-report"]);

        assert!(a.starts_with("idem:"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
