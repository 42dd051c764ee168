//! Error types for the phaseline engine.
//!
//! The taxonomy mirrors how failures actually travel: build and predicate
//! errors are returned to the caller, per-phase handler failures are recorded
//! on the run context, and best-effort collaborator failures (recorders,
//! callbacks, finalizers) are logged and swallowed by the engine.

use std::sync::Arc;
use thiserror::Error;

/// Errors raised while assembling a [`RunHandlerManager`](crate::engine::RunHandlerManager).
#[derive(Debug, Error)]
pub enum BuildError {
    /// The builder was given no handlers.
    #[error("handler set cannot be empty")]
    EmptyHandlerSet,

    /// Two handlers claimed the same phase.
    #[error("phase {phase} is bound to both '{first}' and '{second}'")]
    DuplicatePhaseBinding {
        /// Debug rendering of the contested phase.
        phase: String,
        /// Name of the handler registered first.
        first: String,
        /// Name of the handler registered second.
        second: String,
    },
}

/// Errors that [`start`](crate::engine::RunHandlerManager::start) itself returns.
///
/// Everything else — handler failures, stop signals, idempotency skips — is
/// expressed through the context's `success`/`error`/`stopped`/`skipped`
/// flags instead.
#[derive(Debug, Error)]
pub enum StartError {
    /// A run predicate failed to evaluate. Fatal to the whole run.
    #[error("predicate evaluation failed at phase {phase}: {cause}")]
    Predicate {
        /// Debug rendering of the phase under evaluation.
        phase: String,
        /// The underlying evaluation failure.
        cause: anyhow::Error,
    },
}

/// A failure inside one phase handler execution.
///
/// Stored on the run context (shared between the live context and any
/// pre-call snapshot); never propagated past the execute step.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// External state marked the phase or its task stopped.
    #[error("phase stopped")]
    Stopped {
        /// Identifier of the stopped execution unit, when known.
        unit: Option<String>,
    },

    /// The remote call was never dispatched; carries the underlying cause,
    /// which the engine also applies to the original context.
    #[error("remote launch failed: {0}")]
    RemoteLaunch(Arc<PhaseError>),

    /// Any other handler failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PhaseError {
    /// A stop signal with no unit attached.
    #[must_use]
    pub fn stopped() -> Self {
        Self::Stopped { unit: None }
    }

    /// A stop signal naming the stopped execution unit.
    #[must_use]
    pub fn stopped_unit(unit: impl Into<String>) -> Self {
        Self::Stopped {
            unit: Some(unit.into()),
        }
    }

    /// Wraps a cause as a remote-launch failure.
    #[must_use]
    pub fn remote_launch(cause: PhaseError) -> Self {
        Self::RemoteLaunch(Arc::new(cause))
    }

    /// A generic handler failure from a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Other(anyhow::anyhow!(message.into()))
    }

    /// Returns true for [`PhaseError::Stopped`].
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// Returns true for [`PhaseError::RemoteLaunch`].
    #[must_use]
    pub fn is_remote_launch(&self) -> bool {
        matches!(self, Self::RemoteLaunch(_))
    }
}

/// Errors from [`invoke_handler`](crate::engine::RunHandlerManager::invoke_handler).
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No handler is registered under the requested name.
    #[error("no handler registered under name '{0}'")]
    UnknownHandler(String),

    /// The handler itself failed.
    #[error(transparent)]
    Handler(PhaseError),
}
