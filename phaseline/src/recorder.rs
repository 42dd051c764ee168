//! Phase recorders: best-effort progress persistence around each execution.
//!
//! Recorders run before (`ready_for`) and after (`end`) a handler. They are
//! best-effort: the engine logs their failures and never lets them alter
//! control flow or mask the handler's own outcome.

use crate::context::RunContext;
use crate::errors::PhaseError;
use async_trait::async_trait;
use std::sync::Arc;

/// Records phase progress, e.g. to a database or an external task tracker.
#[async_trait]
pub trait PhaseRecorder<C: RunContext>: Send + Sync {
    /// Phase start — about to begin execution.
    async fn ready_for(&self, context: &C) -> anyhow::Result<()>;

    /// Phase end, with the failure if the handler did not succeed.
    async fn end(&self, context: &C, error: Option<&Arc<PhaseError>>) -> anyhow::Result<()>;
}

/// The default recorder: records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRecorder;

#[async_trait]
impl<C: RunContext> PhaseRecorder<C> for NoOpRecorder {
    async fn ready_for(&self, _context: &C) -> anyhow::Result<()> {
        Ok(())
    }

    async fn end(&self, _context: &C, _error: Option<&Arc<PhaseError>>) -> anyhow::Result<()> {
        Ok(())
    }
}
