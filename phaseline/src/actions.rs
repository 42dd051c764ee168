//! Additional context actions: one-shot setup run before the phase chain.
//!
//! Actions run once per `start`, in ascending priority order, before any
//! phase executes. Their failures are logged and never prevent the chain
//! from starting.

use crate::cache::{CacheKind, CacheValue};
use crate::context::RunContext;
use async_trait::async_trait;

/// A one-shot setup step over the context.
#[async_trait]
pub trait AdditionalContextAction<C: RunContext>: Send + Sync {
    /// Performs the setup. Failures are logged by the engine and ignored.
    async fn run(&self, context: &mut C) -> anyhow::Result<()>;

    /// Per-action skip predicate, consulted by the engine before `run`.
    fn skip(&self, _context: &C) -> bool {
        false
    }

    /// Execution priority; smaller runs first.
    fn order(&self) -> i32 {
        0
    }
}

/// A cache-populating action: computes a key and a value and stores the
/// value in one of the context's environment-aware caches.
///
/// The key defaults to the context's environment tag, which covers the
/// common per-environment-resource case. When `use_calculated_cache` is
/// true and a value is already cached for the key, computation is skipped
/// entirely. `None` values are never stored.
///
/// Wrap in [`AwareCacheAction`] (or register through the builder's
/// `cache_action`) to use it as an [`AdditionalContextAction`].
#[async_trait]
pub trait AwareCacheContextAction<C: RunContext>: Send + Sync {
    /// The cache this action populates.
    fn cache_kind(&self) -> CacheKind;

    /// The key to store under. Defaults to the environment tag.
    fn calculate_key(&self, context: &C) -> String {
        context.env_type().to_string()
    }

    /// Computes the value. Only executed when `use_calculated_cache` is
    /// false or nothing is cached for the key yet.
    async fn calculate_value(&self, context: &C) -> anyhow::Result<Option<CacheValue>>;

    /// Whether an existing cached value short-circuits computation.
    fn use_calculated_cache(&self) -> bool {
        false
    }

    /// Per-action skip predicate.
    fn skip(&self, _context: &C) -> bool {
        false
    }

    /// Execution priority; smaller runs first.
    fn order(&self) -> i32 {
        0
    }
}

/// Adapts an [`AwareCacheContextAction`] into an
/// [`AdditionalContextAction`].
pub struct AwareCacheAction<T>(pub T);

#[async_trait]
impl<C, T> AdditionalContextAction<C> for AwareCacheAction<T>
where
    C: RunContext,
    T: AwareCacheContextAction<C>,
{
    async fn run(&self, context: &mut C) -> anyhow::Result<()> {
        let key = self.0.calculate_key(context);
        let cache = context.aware_cache(self.0.cache_kind()).ok_or_else(|| {
            anyhow::anyhow!("no {:?} cache installed on the context", self.0.cache_kind())
        })?;

        if self.0.use_calculated_cache() && cache.get(&key).is_some() {
            return Ok(());
        }

        if let Some(value) = self.0.calculate_value(context).await? {
            cache.put(&key, value);
        }
        Ok(())
    }

    fn skip(&self, context: &C) -> bool {
        self.0.skip(context)
    }

    fn order(&self) -> i32 {
        self.0.order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AwareCache, AwareCacheMap, MapAwareCache};
    use crate::context::{BasicContext, EnvType};
    use crate::phase::Phase;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    enum Only {
        One,
    }

    impl Phase for Only {
        fn ordinal(&self) -> usize {
            0
        }

        fn values() -> &'static [Self] {
            &[Self::One]
        }
    }

    struct ClientAction {
        computations: AtomicUsize,
        cached_short_circuit: bool,
    }

    #[async_trait]
    impl AwareCacheContextAction<BasicContext<Only>> for ClientAction {
        fn cache_kind(&self) -> CacheKind {
            CacheKind::Messaging
        }

        async fn calculate_value(
            &self,
            _context: &BasicContext<Only>,
        ) -> anyhow::Result<Option<CacheValue>> {
            self.computations.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Arc::new("client-handle".to_string())))
        }

        fn use_calculated_cache(&self) -> bool {
            self.cached_short_circuit
        }
    }

    fn context_with_cache() -> (BasicContext<Only>, Arc<AwareCacheMap>) {
        let map = Arc::new(AwareCacheMap::new());
        map.insert(Arc::new(MapAwareCache::new(CacheKind::Messaging)));
        let mut ctx = BasicContext::with_env(EnvType::new("prod"));
        ctx.install_cache_map(&map);
        (ctx, map)
    }

    #[tokio::test]
    async fn stores_value_under_env_key() {
        let (mut ctx, map) = context_with_cache();
        let action = AwareCacheAction(ClientAction {
            computations: AtomicUsize::new(0),
            cached_short_circuit: false,
        });

        action.run(&mut ctx).await.unwrap();

        let cache = map.get(CacheKind::Messaging).unwrap();
        assert!(cache.get("prod").is_some());
    }

    #[tokio::test]
    async fn cached_value_short_circuits_computation() {
        let (mut ctx, map) = context_with_cache();
        map.get(CacheKind::Messaging)
            .unwrap()
            .put("prod", Arc::new("existing".to_string()));

        let action = AwareCacheAction(ClientAction {
            computations: AtomicUsize::new(0),
            cached_short_circuit: true,
        });
        action.run(&mut ctx).await.unwrap();

        assert_eq!(action.0.computations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn none_values_are_not_stored() {
        struct Empty;

        #[async_trait]
        impl AwareCacheContextAction<BasicContext<Only>> for Empty {
            fn cache_kind(&self) -> CacheKind {
                CacheKind::Messaging
            }

            async fn calculate_value(
                &self,
                _context: &BasicContext<Only>,
            ) -> anyhow::Result<Option<CacheValue>> {
                Ok(None)
            }
        }

        let (mut ctx, map) = context_with_cache();
        AwareCacheAction(Empty).run(&mut ctx).await.unwrap();

        assert!(map.get(CacheKind::Messaging).unwrap().get("prod").is_none());
    }

    #[tokio::test]
    async fn missing_cache_is_an_error() {
        let mut ctx: BasicContext<Only> = BasicContext::with_env(EnvType::new("prod"));
        let action = AwareCacheAction(ClientAction {
            computations: AtomicUsize::new(0),
            cached_short_circuit: false,
        });

        assert!(action.run(&mut ctx).await.is_err());
    }
}
