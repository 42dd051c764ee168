//! Phase definitions: the totally ordered stages of one pipeline family.
//!
//! A pipeline family declares its phases as a `Copy` enum implementing
//! [`Phase`]. Ordinals must be unique and contiguous in declaration order;
//! successor lookup is purely ordinal-based.

use crate::engine::PhaseExecutor;
use crate::idempotent::IdempotentJudge;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// One named, ordered stage in a pipeline family.
///
/// Implementations are plain value enums; all runtime behavior (async flag,
/// deprecation, phase-scoped judge, executor override) is declared through
/// the defaulted methods. Phases travel inside serialized contexts, hence
/// the serde bounds.
pub trait Phase:
    Copy + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Position within the family. Unique, contiguous, smaller runs first.
    fn ordinal(&self) -> usize;

    /// All phases of the family, in execution order.
    fn values() -> &'static [Self];

    /// The phase with `ordinal + 1`, or `None` at the last.
    fn next(&self) -> Option<Self> {
        Self::values().get(self.ordinal() + 1).copied()
    }

    /// The minimum-ordinal phase of the family.
    fn first() -> Option<Self> {
        Self::values().first().copied()
    }

    /// Whether this phase is dispatched fire-and-forget on an executor.
    fn is_async(&self) -> bool {
        false
    }

    /// Deprecated phases are skipped without predicate checks, recording,
    /// or execution. Keep the variant so persisted ordinals stay parseable.
    fn is_deprecated(&self) -> bool {
        false
    }

    /// A judge statically bound to this phase. Takes priority over the
    /// manager's global judge, but not over a judge registered on the
    /// manager for this phase. Return a shared instance, not a fresh one.
    fn idempotent_judge(&self) -> Option<Arc<dyn IdempotentJudge>> {
        None
    }

    /// Executor override for an asynchronous phase. `None` uses the
    /// manager's default single-worker executor.
    fn executor(&self) -> Option<Arc<dyn PhaseExecutor>> {
        None
    }
}
