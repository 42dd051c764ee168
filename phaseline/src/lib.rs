//! # Phaseline
//!
//! A phase-ordered execution engine for long-running orchestration
//! pipelines.
//!
//! Phaseline runs a fixed, ordered set of named phases against a mutable
//! run context, with support for:
//!
//! - **Phase-ordered dispatch**: one handler per phase, walked in strict
//!   ordinal order, resumable from any position
//! - **Fire-and-forget asynchronous phases**: dispatched on a per-manager
//!   executor against an independent context duplicate
//! - **Skip predicates and idempotency guards**: per-handler gates plus a
//!   probabilistic dedup layer (local or distributed bloom filter)
//! - **Environment-aware caching**: purpose-tagged caches shared across all
//!   contexts of a family
//! - **Guaranteed finalization**: every handler's finalizer runs at chain
//!   termination, whatever the outcome
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use phaseline::prelude::*;
//!
//! let manager = RunHandlerManager::builder()
//!     .handler(Arc::new(FetchHandler::new()))
//!     .handler(Arc::new(ProcessHandler::new()))
//!     .global_idempotent_judge(Arc::new(BloomFilterJudge::local()))
//!     .build()?;
//!
//! let mut context = DeliveryContext::new();
//! manager.start(&mut context).await?;
//! assert!(context.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod actions;
pub mod cache;
pub mod callback;
pub mod context;
pub mod engine;
pub mod errors;
pub mod handler;
pub mod idempotent;
pub mod phase;
pub mod predicate;
pub mod recorder;
pub mod stop;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actions::{AdditionalContextAction, AwareCacheAction, AwareCacheContextAction};
    pub use crate::cache::{
        AwareCache, AwareCacheMap, BoundedAwareCache, CacheKind, CacheValue, MapAwareCache,
    };
    pub use crate::callback::{NoOpCallback, PhaseCallback, RunHandlerEvent};
    pub use crate::context::{BasicContext, EnvType, RunContext, RunState};
    pub use crate::engine::{
        ManagerCache, PhaseExecutor, RunHandlerManager, RunHandlerManagerBuilder,
        SingleWorkerExecutor, SpawnExecutor,
    };
    pub use crate::errors::{BuildError, InvokeError, PhaseError, StartError};
    pub use crate::handler::RunHandler;
    pub use crate::idempotent::{
        digest_key, BitArrayClient, BloomFilterJudge, BloomParams, DistributedOptions,
        IdempotentJudge, InMemoryBitArray, LayeredJudge, PrecedingJudge, PreciseVerifier,
    };
    pub use crate::phase::Phase;
    pub use crate::predicate::{AlwaysRun, HandlerRunPredicate, NeverRun};
    pub use crate::recorder::{NoOpRecorder, PhaseRecorder};
    pub use crate::stop::{NoOpStopStatusChecker, StopStatusChecker};
}
