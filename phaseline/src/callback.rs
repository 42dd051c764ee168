//! Phase callbacks: event emission after a successful handler execution.

use crate::context::RunContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Event emitted after a handler executes successfully.
///
/// Carries a copy of the context as it looked at emission time plus the
/// handler's extra info, if it provides any. There is no guarantee on
/// delivery timing relative to subsequent phases.
#[derive(Debug, Clone)]
pub struct RunHandlerEvent<C: RunContext> {
    context: C,
    extra: Option<serde_json::Value>,
    emitted_at: DateTime<Utc>,
}

impl<C: RunContext> RunHandlerEvent<C> {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(context: C, extra: Option<serde_json::Value>) -> Self {
        Self {
            context,
            extra,
            emitted_at: Utc::now(),
        }
    }

    /// The context as it looked when the event was emitted.
    #[must_use]
    pub fn context(&self) -> &C {
        &self.context
    }

    /// The handler's extra info payload.
    #[must_use]
    pub fn extra(&self) -> Option<&serde_json::Value> {
        self.extra.as_ref()
    }

    /// The phase the event was emitted from.
    #[must_use]
    pub fn phase(&self) -> Option<C::Phase> {
        self.context.current_phase()
    }

    /// Emission timestamp.
    #[must_use]
    pub fn emitted_at(&self) -> DateTime<Utc> {
        self.emitted_at
    }
}

/// Receives phase-completion events. Failures are logged and swallowed by
/// the engine; a callback must not affect the run's outcome.
#[async_trait]
pub trait PhaseCallback<C: RunContext>: Send + Sync {
    /// Called once after each successful handler execution.
    async fn on_phase_complete(&self, event: RunHandlerEvent<C>) -> anyhow::Result<()>;
}

/// The default callback: discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

#[async_trait]
impl<C: RunContext> PhaseCallback<C> for NoOpCallback {
    async fn on_phase_complete(&self, _event: RunHandlerEvent<C>) -> anyhow::Result<()> {
        Ok(())
    }
}
