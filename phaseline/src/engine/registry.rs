//! Process-level manager cache: one singleton manager per context type.

use crate::context::RunContext;
use crate::errors::BuildError;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Caches one [`RunHandlerManager`](super::RunHandlerManager) per context
/// type, building it on first request.
///
/// A pipeline family is identified by its context type; mixing handlers of
/// different families in one manager is unrepresentable, since a manager is
/// generic over exactly one context (and therefore one phase set).
#[derive(Default)]
pub struct ManagerCache {
    inner: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ManagerCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached manager for `C`, building and caching it with
    /// `build` when absent.
    pub fn get_or_build<C, F>(
        &self,
        build: F,
    ) -> Result<Arc<super::RunHandlerManager<C>>, BuildError>
    where
        C: RunContext,
        F: FnOnce() -> Result<super::RunHandlerManager<C>, BuildError>,
    {
        use dashmap::mapref::entry::Entry;

        match self.inner.entry(TypeId::of::<C>()) {
            Entry::Occupied(mut entry) => {
                if let Ok(manager) =
                    Arc::clone(entry.get()).downcast::<super::RunHandlerManager<C>>()
                {
                    return Ok(manager);
                }
                // slots are keyed by the context type, so this replace path
                // is unreachable in practice
                let manager = Arc::new(build()?);
                entry.insert(Arc::clone(&manager) as Arc<dyn Any + Send + Sync>);
                Ok(manager)
            }
            Entry::Vacant(slot) => {
                let manager = Arc::new(build()?);
                slot.insert(Arc::clone(&manager) as Arc<dyn Any + Send + Sync>);
                Ok(manager)
            }
        }
    }

    /// Returns the cached manager for `C`, if one was built.
    #[must_use]
    pub fn get<C: RunContext>(&self) -> Option<Arc<super::RunHandlerManager<C>>> {
        let erased = Arc::clone(self.inner.get(&TypeId::of::<C>())?.value());
        erased.downcast::<super::RunHandlerManager<C>>().ok()
    }

    /// Drops the cached manager for `C`.
    pub fn remove<C: RunContext>(&self) {
        self.inner.remove(&TypeId::of::<C>());
    }

    /// Number of cached managers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
