//! Stop-status checking: external cancellation surfaced into the chain.

use crate::context::RunContext;
use crate::errors::PhaseError;
use async_trait::async_trait;

/// Consulted once at the top of every handler execution.
///
/// When external state marks the phase or its task stopped, `check` returns
/// [`PhaseError::Stopped`]; the engine records the failure and sets the
/// context's `stopped` flag, aborting just that phase's handler body.
#[async_trait]
pub trait StopStatusChecker<C: RunContext>: Send + Sync {
    /// `Err(PhaseError::Stopped { .. })` when the run has been stopped.
    async fn check(&self, context: &C) -> Result<(), PhaseError>;
}

/// The default checker: never signals a stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStopStatusChecker;

#[async_trait]
impl<C: RunContext> StopStatusChecker<C> for NoOpStopStatusChecker {
    async fn check(&self, _context: &C) -> Result<(), PhaseError> {
        Ok(())
    }
}
