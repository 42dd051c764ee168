//! Run predicates: per-handler gates evaluated before each phase visit.

use crate::context::RunContext;
use async_trait::async_trait;

/// Decides whether a handler runs for the current phase visit.
///
/// A veto (`Ok(false)`) advances the chain past the phase without executing
/// or recording it. An evaluation failure is fatal to the whole run and
/// propagates out of `start`.
#[async_trait]
pub trait HandlerRunPredicate<C: RunContext>: Send + Sync {
    /// `Ok(true)` to run the handler, `Ok(false)` to veto this visit.
    async fn should_run(&self, context: &C) -> anyhow::Result<bool>;
}

/// The default predicate: never vetoes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRun;

#[async_trait]
impl<C: RunContext> HandlerRunPredicate<C> for AlwaysRun {
    async fn should_run(&self, _context: &C) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Always vetoes. Useful for retiring a handler without unbinding it, so
/// persisted phase ordinals keep resolving.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRun;

#[async_trait]
impl<C: RunContext> HandlerRunPredicate<C> for NeverRun {
    async fn should_run(&self, _context: &C) -> anyhow::Result<bool> {
        Ok(false)
    }
}
