//! The phase chain engine: builds a manager over one handler set and drives
//! contexts through the family's phases.

use crate::actions::{AdditionalContextAction, AwareCacheAction, AwareCacheContextAction};
use crate::cache::{AwareCache, AwareCacheMap};
use crate::callback::{NoOpCallback, PhaseCallback, RunHandlerEvent};
use crate::context::RunContext;
use crate::errors::{BuildError, InvokeError, PhaseError, StartError};
use crate::handler::RunHandler;
use crate::idempotent::IdempotentJudge;
use crate::phase::Phase;
use crate::recorder::{NoOpRecorder, PhaseRecorder};
use crate::stop::{NoOpStopStatusChecker, StopStatusChecker};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::executor::{PhaseExecutor, SingleWorkerExecutor};

/// How one chain walk ended. Internal; callers read the context flags.
enum ChainOutcome {
    /// Walked off the end of the phase set.
    Completed,
    /// No local handler for the next phase; ownership lies elsewhere.
    HandedOff,
    /// A synchronous phase failed; the failure is on the context.
    Failed,
    /// A terminal idempotency skip aborted the remaining chain.
    TerminalSkip { key: String },
}

/// Verdict of the idempotency gate for one phase visit.
enum Gate {
    Execute,
    SkipPhase,
    AbortChain { key: String },
}

struct EngineInner<C: RunContext> {
    handlers: HashMap<C::Phase, Arc<dyn RunHandler<C>>>,
    registration_order: Vec<Arc<dyn RunHandler<C>>>,
    first_phase: C::Phase,
    executor: Arc<dyn PhaseExecutor>,
    callback: Arc<dyn PhaseCallback<C>>,
    stop_checker: Arc<dyn StopStatusChecker<C>>,
    recorder: Arc<dyn PhaseRecorder<C>>,
    actions: Vec<Arc<dyn AdditionalContextAction<C>>>,
    cache_map: Arc<AwareCacheMap>,
    global_judge: Option<Arc<dyn IdempotentJudge>>,
    registered_judges: RwLock<HashMap<C::Phase, Arc<dyn IdempotentJudge>>>,
}

impl<C: RunContext> EngineInner<C> {
    async fn apply_additional_actions(&self, context: &mut C) {
        for action in &self.actions {
            if action.skip(context) {
                continue;
            }
            if let Err(e) = action.run(context).await {
                warn!(error = %e, "additional context action failed");
            }
        }
    }

    async fn run_finalizers(&self, context: &mut C) {
        for handler in &self.registration_order {
            if let Err(e) = handler.finally_handle(context).await {
                error!(error = %e, handler = handler.name(), "finalizer failed");
            }
        }
    }

    /// Executes one handler against a context: stop check, recording,
    /// failure classification, callback emission, post hook.
    async fn execute(&self, context: &mut C, handler: &dyn RunHandler<C>) {
        let recorder = handler
            .recorder()
            .unwrap_or_else(|| Arc::clone(&self.recorder));

        // A remote-trigger handler may wake a process that mutates the
        // shared context out-of-band; recording must reflect the pre-call
        // state, so it runs against an independent snapshot.
        let mut snapshot = handler.remote_trigger().then(|| context.duplicate());

        let result = match self.stop_checker.check(context).await {
            Err(e) => Err(e),
            Ok(()) => {
                Self::record_ready(recorder.as_ref(), context).await;
                handler.handle(context).await
            }
        };

        match result {
            Ok(()) => {
                Self::record_end(recorder.as_ref(), snapshot.as_ref().unwrap_or(&*context), None)
                    .await;
                let extra = handler.extra_info(context);
                let event = RunHandlerEvent::new(context.clone(), extra);
                if let Err(e) = self.callback.on_phase_complete(event).await {
                    error!(error = %e, handler = handler.name(), "phase callback failed");
                }
            }
            Err(e) => {
                let failure = Arc::new(e);
                Self::mark_failed(context, &failure);
                if let Some(s) = snapshot.as_mut() {
                    Self::mark_failed(s, &failure);
                }
                if let PhaseError::RemoteLaunch(cause) = failure.as_ref() {
                    // The request never left the process: both contexts must
                    // carry the underlying cause, not the wrapper.
                    Self::mark_failed(context, cause);
                    if let Some(s) = snapshot.as_mut() {
                        Self::mark_failed(s, cause);
                    }
                }
                if failure.is_stopped() {
                    context.set_stopped(true);
                    if let Some(s) = snapshot.as_mut() {
                        s.set_stopped(true);
                    }
                }
                Self::record_end(
                    recorder.as_ref(),
                    snapshot.as_ref().unwrap_or(&*context),
                    Some(&failure),
                )
                .await;
            }
        }

        let post_result = match snapshot.as_mut() {
            Some(s) => handler.post_handle(s).await,
            None => handler.post_handle(context).await,
        };
        if let Err(e) = post_result {
            error!(error = %e, handler = handler.name(), "post-handle hook failed");
        }
    }

    fn mark_failed(context: &mut C, error: &Arc<PhaseError>) {
        context.set_success(false);
        context.set_error(Some(Arc::clone(error)));
    }

    async fn record_ready(recorder: &dyn PhaseRecorder<C>, context: &C) {
        if let Err(e) = recorder.ready_for(context).await {
            error!(error = %e, "failed to record phase start");
        }
    }

    async fn record_end(
        recorder: &dyn PhaseRecorder<C>,
        context: &C,
        error: Option<&Arc<PhaseError>>,
    ) {
        if let Err(e) = recorder.end(context, error).await {
            error!(error = %e, "failed to record phase end");
        }
    }
}

/// Drives contexts of one family through the phase chain.
///
/// Built over the ordered handler set of the family; `start` walks phases
/// from the context's current position (or the family's first handled
/// phase), dispatching the bound handler at each non-skipped,
/// non-deprecated phase.
pub struct RunHandlerManager<C: RunContext> {
    inner: Arc<EngineInner<C>>,
}

impl<C: RunContext> RunHandlerManager<C> {
    /// Starts building a manager.
    #[must_use]
    pub fn builder() -> RunHandlerManagerBuilder<C> {
        RunHandlerManagerBuilder::new()
    }

    /// Runs the phase chain over the given context.
    ///
    /// Returns `Err` only for predicate-evaluation failures; every other
    /// outcome — handler failure, stop signal, idempotency skip — is
    /// expressed through the context's flags. Finalizers run regardless.
    pub async fn start(&self, context: &mut C) -> Result<(), StartError> {
        context.install_cache_map(&self.inner.cache_map);
        self.inner.apply_additional_actions(context).await;

        let result = match self.run_chain(context).await {
            Ok(ChainOutcome::TerminalSkip { key }) => {
                warn!(key = %key, "idempotent judgment skipped all remaining phases");
                context.set_skipped(true);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        self.inner.run_finalizers(context).await;
        result
    }

    /// Default-constructs the bound context type, runs the chain, and
    /// returns the finished context for inspection.
    pub async fn start_default(&self) -> Result<C, StartError>
    where
        C: Default,
    {
        let mut context = C::default();
        self.start(&mut context).await?;
        Ok(context)
    }

    /// Registers a judge for one phase, shadowing the phase-declared and
    /// global judges. Returns the manager for chaining.
    pub fn add_idempotent_judge(
        &self,
        phase: C::Phase,
        judge: Arc<dyn IdempotentJudge>,
    ) -> &Self {
        self.inner.registered_judges.write().insert(phase, judge);
        self
    }

    /// Directly invokes one handler by name, outside the phase chain.
    ///
    /// Bypasses predicates, idempotency, recording, and chain movement —
    /// a raw escape hatch.
    pub async fn invoke_handler(&self, name: &str, context: &mut C) -> Result<(), InvokeError> {
        let handler = self
            .inner
            .registration_order
            .iter()
            .find(|h| h.name() == name)
            .ok_or_else(|| InvokeError::UnknownHandler(name.to_string()))?;
        handler.handle(context).await.map_err(InvokeError::Handler)
    }

    /// The engine-owned cache map.
    #[must_use]
    pub fn cache_map(&self) -> &Arc<AwareCacheMap> {
        &self.inner.cache_map
    }

    /// Number of handlers bound to this manager.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.registration_order.len()
    }

    async fn run_chain(&self, context: &mut C) -> Result<ChainOutcome, StartError> {
        let mut phase = context.current_phase().or(Some(self.inner.first_phase));
        loop {
            let Some(p) = phase else {
                // chain exhausted; clear the position to mark termination
                context.set_current_phase(None);
                return Ok(ChainOutcome::Completed);
            };

            if p.is_deprecated() {
                debug!(phase = ?p, "skipping deprecated phase");
                phase = p.next();
                continue;
            }

            let Some(handler) = self.inner.handlers.get(&p) else {
                // No local handler: ownership of this phase lies elsewhere,
                // e.g. a remote service continues the chain.
                debug!(phase = ?p, "no local handler; chain continues elsewhere");
                return Ok(ChainOutcome::HandedOff);
            };

            context.set_current_phase(Some(p));
            context.set_success(true);
            context.set_error(None);

            let mut vetoed = false;
            for predicate in handler.predicates() {
                match predicate.should_run(context).await {
                    Ok(true) => {}
                    Ok(false) => {
                        vetoed = true;
                        break;
                    }
                    Err(cause) => {
                        return Err(StartError::Predicate {
                            phase: format!("{p:?}"),
                            cause,
                        });
                    }
                }
            }
            if vetoed {
                debug!(phase = ?p, handler = handler.name(), "predicate veto; phase skipped");
                phase = context.current_phase().and_then(|cur| cur.next());
                continue;
            }

            match self.idempotency_gate(context, p).await {
                Gate::Execute => {}
                Gate::SkipPhase => {
                    phase = context.current_phase().and_then(|cur| cur.next());
                    continue;
                }
                Gate::AbortChain { key } => {
                    return Ok(ChainOutcome::TerminalSkip { key });
                }
            }

            if p.is_async() {
                let mut duplicate = context.duplicate();
                let handler = Arc::clone(handler);
                let inner = Arc::clone(&self.inner);
                let executor = p
                    .executor()
                    .unwrap_or_else(|| Arc::clone(&self.inner.executor));
                debug!(phase = ?p, handler = handler.name(), "dispatching asynchronous phase");
                executor.submit(Box::pin(async move {
                    // the worker owns the duplicate; its mutations never
                    // race with the driving chain
                    inner.execute(&mut duplicate, handler.as_ref()).await;
                }));
                // advance immediately; asynchronous phases never block the
                // driving chain
                phase = context.current_phase().and_then(|cur| cur.next());
                continue;
            }

            self.inner.execute(context, handler.as_ref()).await;
            if context.is_success() {
                // the handler may have moved the position, so read it back
                phase = context.current_phase().and_then(|cur| cur.next());
            } else {
                return Ok(ChainOutcome::Failed);
            }
        }
    }

    /// Asks the highest-priority judge present — registered, then
    /// phase-declared, then global. The first present judge decides.
    async fn idempotency_gate(&self, context: &C, phase: C::Phase) -> Gate {
        let Some(key) = context.idempotent_key() else {
            return Gate::Execute;
        };

        let registered = self.inner.registered_judges.read().get(&phase).cloned();
        let judge = registered
            .or_else(|| phase.idempotent_judge())
            .or_else(|| self.inner.global_judge.clone());
        let Some(judge) = judge else {
            return Gate::Execute;
        };

        if judge.judge(&key).await {
            info!(key = %key, phase = ?phase, "task already executed; skipping phase");
            if context.terminal_skip() {
                return Gate::AbortChain { key };
            }
            Gate::SkipPhase
        } else {
            debug!(key = %key, phase = ?phase, "task not seen before; key registered");
            judge.put(&key).await;
            Gate::Execute
        }
    }
}

/// Assembles a [`RunHandlerManager`] from handlers and collaborators.
pub struct RunHandlerManagerBuilder<C: RunContext> {
    handlers: Vec<Arc<dyn RunHandler<C>>>,
    executor: Option<Arc<dyn PhaseExecutor>>,
    callback: Option<Arc<dyn PhaseCallback<C>>>,
    stop_checker: Option<Arc<dyn StopStatusChecker<C>>>,
    recorder: Option<Arc<dyn PhaseRecorder<C>>>,
    actions: Vec<Arc<dyn AdditionalContextAction<C>>>,
    cache_map: Arc<AwareCacheMap>,
    global_judge: Option<Arc<dyn IdempotentJudge>>,
}

impl<C: RunContext> RunHandlerManagerBuilder<C> {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            executor: None,
            callback: None,
            stop_checker: None,
            recorder: None,
            actions: Vec::new(),
            cache_map: Arc::new(AwareCacheMap::new()),
            global_judge: None,
        }
    }

    /// Adds a handler. Registration order is the finalizer order.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn RunHandler<C>>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Replaces the default single-worker executor for asynchronous phases.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn PhaseExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Installs the phase-completion callback.
    #[must_use]
    pub fn callback(mut self, callback: Arc<dyn PhaseCallback<C>>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Installs the stop-status checker.
    #[must_use]
    pub fn stop_checker(mut self, checker: Arc<dyn StopStatusChecker<C>>) -> Self {
        self.stop_checker = Some(checker);
        self
    }

    /// Installs the default recorder, used by handlers without their own.
    #[must_use]
    pub fn recorder(mut self, recorder: Arc<dyn PhaseRecorder<C>>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Adds an additional context action; sorted by `order` at build time.
    #[must_use]
    pub fn action(mut self, action: Arc<dyn AdditionalContextAction<C>>) -> Self {
        self.actions.push(action);
        self
    }

    /// Adds a cache-populating action.
    #[must_use]
    pub fn cache_action<T>(self, action: T) -> Self
    where
        T: AwareCacheContextAction<C> + 'static,
    {
        self.action(Arc::new(AwareCacheAction(action)))
    }

    /// Registers an environment-aware cache under its kind.
    #[must_use]
    pub fn cache(self, cache: Arc<dyn AwareCache>) -> Self {
        self.cache_map.insert(cache);
        self
    }

    /// Replaces the engine-owned cache map entirely.
    #[must_use]
    pub fn cache_map(mut self, map: Arc<AwareCacheMap>) -> Self {
        self.cache_map = map;
        self
    }

    /// Installs the lowest-priority, manager-wide judge.
    #[must_use]
    pub fn global_idempotent_judge(mut self, judge: Arc<dyn IdempotentJudge>) -> Self {
        self.global_judge = Some(judge);
        self
    }

    /// Validates the handler set and assembles the manager.
    pub fn build(self) -> Result<RunHandlerManager<C>, BuildError> {
        if self.handlers.is_empty() {
            return Err(BuildError::EmptyHandlerSet);
        }

        let mut handlers: HashMap<C::Phase, Arc<dyn RunHandler<C>>> = HashMap::new();
        for handler in &self.handlers {
            if let Some(previous) = handlers.insert(handler.phase(), Arc::clone(handler)) {
                return Err(BuildError::DuplicatePhaseBinding {
                    phase: format!("{:?}", handler.phase()),
                    first: previous.name().to_string(),
                    second: handler.name().to_string(),
                });
            }
        }

        let Some(first_phase) = handlers.keys().copied().min_by_key(|p| p.ordinal()) else {
            return Err(BuildError::EmptyHandlerSet);
        };

        let mut actions = self.actions;
        actions.sort_by_key(|a| a.order());

        Ok(RunHandlerManager {
            inner: Arc::new(EngineInner {
                handlers,
                registration_order: self.handlers,
                first_phase,
                executor: self
                    .executor
                    .unwrap_or_else(|| Arc::new(SingleWorkerExecutor::new())),
                callback: self.callback.unwrap_or_else(|| Arc::new(NoOpCallback)),
                stop_checker: self
                    .stop_checker
                    .unwrap_or_else(|| Arc::new(NoOpStopStatusChecker)),
                recorder: self.recorder.unwrap_or_else(|| Arc::new(NoOpRecorder)),
                actions,
                cache_map: self.cache_map,
                global_judge: self.global_judge,
                registered_judges: RwLock::new(HashMap::new()),
            }),
        })
    }
}

impl<C: RunContext> Default for RunHandlerManagerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
