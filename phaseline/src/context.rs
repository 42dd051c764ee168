//! Run context: the mutable state that flows through one pipeline run.
//!
//! Concrete contexts embed a [`RunState`] and get every flag accessor for
//! free through [`RunContext`]'s provided methods. Capabilities the engine
//! probes for (idempotent key, terminal skip, cache access) are defaulted
//! trait methods whose defaults express absence.

use crate::cache::{AwareCache, AwareCacheMap, CacheKind};
use crate::errors::PhaseError;
use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Environment tag for a run (a deployment, region, or tenant environment).
///
/// Used as the default cache key by env-scoped additional actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvType(String);

impl EnvType {
    /// Creates an environment tag.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EnvType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// The engine-owned portion of a run context.
///
/// The error slot is shared (`Arc`) so a pre-call snapshot and the live
/// context can carry the same cause; it does not travel over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RunState<P: Phase> {
    /// Identity of this run.
    pub run_id: Uuid,
    /// Whether the most recent phase succeeded.
    pub success: bool,
    /// The failure recorded by the most recent phase, if any.
    #[serde(skip)]
    pub error: Option<Arc<PhaseError>>,
    /// The phase the run is currently positioned at. `None` before the
    /// first phase and after the chain is exhausted.
    pub current_phase: Option<P>,
    /// Set when a stop signal aborted a phase.
    pub stopped: bool,
    /// Set when a terminal idempotency skip aborted the remaining chain.
    pub skipped: bool,
    /// Environment the run executes in.
    pub env_type: EnvType,
    /// Opaque domain payload.
    pub extra: serde_json::Value,
}

impl<P: Phase> RunState<P> {
    /// A fresh state tagged with an environment.
    #[must_use]
    pub fn new(env_type: EnvType) -> Self {
        Self {
            env_type,
            ..Self::default()
        }
    }
}

impl<P: Phase> Default for RunState<P> {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            success: false,
            error: None,
            current_phase: None,
            stopped: false,
            skipped: false,
            env_type: EnvType::default(),
            extra: serde_json::Value::Null,
        }
    }
}

/// The mutable unit of state flowing through one pipeline run.
///
/// Duplication is an explicit deep-clone contract: [`duplicate`]
/// (`RunContext::duplicate`) must yield an independent mutable copy whose
/// mutations never race with the original. The default is `Clone::clone`,
/// which is correct as long as the context owns its data (shared handles
/// such as the cache map are intentionally shared, never copied).
pub trait RunContext: Clone + Send + Sync + 'static {
    /// The phase family this context runs through.
    type Phase: Phase;

    /// The embedded engine state.
    fn state(&self) -> &RunState<Self::Phase>;

    /// Mutable access to the embedded engine state.
    fn state_mut(&mut self) -> &mut RunState<Self::Phase>;

    /// Identity of this run.
    fn run_id(&self) -> Uuid {
        self.state().run_id
    }

    /// Whether the most recent phase succeeded.
    fn is_success(&self) -> bool {
        self.state().success
    }

    /// Sets the success flag.
    fn set_success(&mut self, success: bool) {
        self.state_mut().success = success;
    }

    /// The failure recorded by the most recent phase, if any.
    fn error(&self) -> Option<&Arc<PhaseError>> {
        self.state().error.as_ref()
    }

    /// Sets or clears the recorded failure.
    fn set_error(&mut self, error: Option<Arc<PhaseError>>) {
        self.state_mut().error = error;
    }

    /// The phase the run is currently positioned at.
    fn current_phase(&self) -> Option<Self::Phase> {
        self.state().current_phase
    }

    /// Repositions the run.
    fn set_current_phase(&mut self, phase: Option<Self::Phase>) {
        self.state_mut().current_phase = phase;
    }

    /// Whether a stop signal aborted a phase of this run.
    fn is_stopped(&self) -> bool {
        self.state().stopped
    }

    /// Sets the stopped flag.
    fn set_stopped(&mut self, stopped: bool) {
        self.state_mut().stopped = stopped;
    }

    /// Whether a terminal idempotency skip aborted the remaining chain.
    fn is_skipped(&self) -> bool {
        self.state().skipped
    }

    /// Sets the skipped flag.
    fn set_skipped(&mut self, skipped: bool) {
        self.state_mut().skipped = skipped;
    }

    /// Environment the run executes in.
    fn env_type(&self) -> &EnvType {
        &self.state().env_type
    }

    /// Opaque domain payload.
    fn extra(&self) -> &serde_json::Value {
        &self.state().extra
    }

    /// Replaces the opaque domain payload.
    fn set_extra(&mut self, extra: serde_json::Value) {
        self.state_mut().extra = extra;
    }

    /// An independent deep copy, used to isolate async or remote-triggered
    /// mutation from the driving chain.
    fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Overwrites this context with another's state.
    fn cover(&mut self, other: &Self) {
        *self = other.clone();
    }

    /// Terminal cleanup hook.
    fn clean(&mut self) {}

    /// Deterministic identifier of "this logical task". Equal keys denote
    /// the same unit of work across retries and re-deliveries. `None`
    /// disables idempotency judgment for this context.
    fn idempotent_key(&self) -> Option<String> {
        None
    }

    /// When true, an idempotency skip aborts the whole remaining chain
    /// instead of just the matched phase.
    fn terminal_skip(&self) -> bool {
        false
    }

    /// Called once at the top of `start` with the engine-owned cache map.
    /// Contexts that expose [`aware_cache`](RunContext::aware_cache) keep
    /// the reference; the default discards it.
    fn install_cache_map(&mut self, _map: &Arc<AwareCacheMap>) {}

    /// Looks up an environment-scoped cache by purpose.
    fn aware_cache(&self, _kind: CacheKind) -> Option<Arc<dyn AwareCache>> {
        None
    }
}

/// A minimal ready-made context for pipelines without domain state of their
/// own. Domain data rides in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BasicContext<P: Phase> {
    state: RunState<P>,
    #[serde(skip)]
    cache_map: Option<Arc<AwareCacheMap>>,
}

impl<P: Phase> BasicContext<P> {
    /// A fresh context for the default environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh context tagged with an environment.
    #[must_use]
    pub fn with_env(env_type: EnvType) -> Self {
        Self {
            state: RunState::new(env_type),
            cache_map: None,
        }
    }
}

impl<P: Phase> Default for BasicContext<P> {
    fn default() -> Self {
        Self {
            state: RunState::default(),
            cache_map: None,
        }
    }
}

impl<P: Phase> RunContext for BasicContext<P> {
    type Phase = P;

    fn state(&self) -> &RunState<P> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RunState<P> {
        &mut self.state
    }

    fn install_cache_map(&mut self, map: &Arc<AwareCacheMap>) {
        self.cache_map = Some(Arc::clone(map));
    }

    fn aware_cache(&self, kind: CacheKind) -> Option<Arc<dyn AwareCache>> {
        self.cache_map.as_ref().and_then(|m| m.get(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    enum Ship {
        Pack,
        Send,
    }

    impl Phase for Ship {
        fn ordinal(&self) -> usize {
            *self as usize
        }

        fn values() -> &'static [Self] {
            &[Self::Pack, Self::Send]
        }
    }

    #[test]
    fn duplicate_is_independent() {
        let mut ctx: BasicContext<Ship> = BasicContext::new();
        ctx.set_current_phase(Some(Ship::Pack));
        ctx.set_success(true);

        let mut dup = ctx.duplicate();
        dup.set_current_phase(Some(Ship::Send));
        dup.set_success(false);

        assert_eq!(ctx.current_phase(), Some(Ship::Pack));
        assert!(ctx.is_success());
        assert_eq!(dup.current_phase(), Some(Ship::Send));
    }

    #[test]
    fn duplicate_keeps_run_identity() {
        let ctx: BasicContext<Ship> = BasicContext::new();
        let dup = ctx.duplicate();
        assert_eq!(ctx.run_id(), dup.run_id());
    }

    #[test]
    fn cover_overwrites_state() {
        let mut a: BasicContext<Ship> = BasicContext::new();
        let mut b: BasicContext<Ship> = BasicContext::with_env(EnvType::new("staging"));
        b.set_stopped(true);

        a.cover(&b);
        assert_eq!(a.env_type().as_str(), "staging");
        assert!(a.is_stopped());
    }

    #[test]
    fn serde_round_trip_drops_error_only() {
        let mut ctx: BasicContext<Ship> = BasicContext::with_env(EnvType::new("prod"));
        ctx.set_current_phase(Some(Ship::Send));
        ctx.set_error(Some(Arc::new(crate::errors::PhaseError::msg("boom"))));

        let json = serde_json::to_string(&ctx).unwrap();
        let back: BasicContext<Ship> = serde_json::from_str(&json).unwrap();

        assert_eq!(back.current_phase(), Some(Ship::Send));
        assert_eq!(back.env_type().as_str(), "prod");
        assert!(back.error().is_none());
    }

    #[test]
    fn capabilities_default_to_absent() {
        let ctx: BasicContext<Ship> = BasicContext::new();
        assert!(ctx.idempotent_key().is_none());
        assert!(!ctx.terminal_skip());
        assert!(ctx.aware_cache(CacheKind::Messaging).is_none());
    }
}
