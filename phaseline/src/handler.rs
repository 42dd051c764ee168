//! Run handlers: the unit of work bound to exactly one phase.

use crate::context::RunContext;
use crate::errors::PhaseError;
use crate::predicate::{AlwaysRun, HandlerRunPredicate};
use crate::recorder::PhaseRecorder;
use async_trait::async_trait;
use std::sync::Arc;

/// One unit of work bound to exactly one phase of a pipeline family.
///
/// Handlers are stateless services; per-run state lives on the context.
/// Optional capabilities (`remote_trigger`, `extra_info`) are declared by
/// overriding the defaulted methods — the engine queries declarations, it
/// never inspects concrete types.
#[async_trait]
pub trait RunHandler<C: RunContext>: Send + Sync {
    /// Core logic. An `Err` marks the phase failed on the context; the
    /// chain does not advance past a failed synchronous phase.
    async fn handle(&self, context: &mut C) -> Result<(), PhaseError>;

    /// The phase this handler is bound to.
    fn phase(&self) -> C::Phase;

    /// Stable name, used for diagnostics and manual invocation.
    fn name(&self) -> &str;

    /// Gates evaluated before each visit. Any veto skips the phase.
    fn predicates(&self) -> Vec<Arc<dyn HandlerRunPredicate<C>>> {
        vec![Arc::new(AlwaysRun)]
    }

    /// Handler-specific recorder. `None` uses the manager's default.
    fn recorder(&self) -> Option<Arc<dyn PhaseRecorder<C>>> {
        None
    }

    /// Post-processing for this handler, executed whether or not `handle`
    /// failed. Receives the recording snapshot when the handler declares
    /// `remote_trigger`. Failures are logged and swallowed.
    async fn post_handle(&self, _context: &mut C) -> anyhow::Result<()> {
        Ok(())
    }

    /// Guaranteed end-of-chain cleanup, run over the original context after
    /// the whole chain terminates — success, failure, or skip. Failures are
    /// logged and never block the remaining finalizers.
    async fn finally_handle(&self, _context: &mut C) -> anyhow::Result<()> {
        Ok(())
    }

    /// Declares that `handle` wakes a remote process which may mutate the
    /// shared context out-of-band. The engine then records against a
    /// pre-call snapshot instead of the live context.
    fn remote_trigger(&self) -> bool {
        false
    }

    /// Extra info attached to the phase-completion event.
    fn extra_info(&self, _context: &C) -> Option<serde_json::Value> {
        None
    }
}
