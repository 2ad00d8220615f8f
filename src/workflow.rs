//! Workflow state machine for user-initiated mutating operations.
//!
//! A workflow models one create/update/delete against one or more targets as
//! a named, resettable lifecycle, so UI can disable buttons while it runs
//! and surface per-target results afterward. The phase only moves forward
//! (`Pending -> Performing -> Done`) within one cycle; `reset` is the only
//! way back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::action::{Action, Resource};
use crate::contracts::OperationExecutor;
use crate::error::{Error, SharedError};
use crate::store::{Reducer, Store};

/// Lifecycle phase of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Pending,
    Performing,
    Done,
}

/// Per-target outcome of a performed workflow.
#[derive(Debug, Clone)]
pub struct OperationResult<Tgt> {
    pub success: bool,
    pub target: Tgt,
    pub error: Option<SharedError>,
}

impl<Tgt> OperationResult<Tgt> {
    pub fn succeeded(target: Tgt) -> Self {
        Self {
            success: true,
            target,
            error: None,
        }
    }

    pub fn failed(target: Tgt, error: SharedError) -> Self {
        Self {
            success: false,
            target,
            error: Some(error),
        }
    }
}

/// State of one workflow instance.
///
/// "The operation finished" and "every target succeeded" are deliberately
/// distinct: `Done` is reached regardless of individual outcomes, and
/// partial failure stays inspectable per target in `results`.
#[derive(Debug, Clone)]
pub struct WorkflowState<Tgt, P> {
    pub operation: OperationState,
    pub targets: Vec<Tgt>,
    pub params: Option<P>,
    pub results: Vec<OperationResult<Tgt>>,
}

impl<Tgt, P> WorkflowState<Tgt, P> {
    pub fn pending() -> Self {
        Self {
            operation: OperationState::Pending,
            targets: Vec::new(),
            params: None,
            results: Vec::new(),
        }
    }

    /// True iff the operation finished and every target succeeded.
    pub fn is_success(&self) -> bool {
        self.operation == OperationState::Done && self.results.iter().all(|result| result.success)
    }

    /// The targets whose results came back failed.
    pub fn failed_targets(&self) -> impl Iterator<Item = &OperationResult<Tgt>> {
        self.results.iter().filter(|result| !result.success)
    }
}

impl<Tgt, P> Default for WorkflowState<Tgt, P> {
    fn default() -> Self {
        Self::pending()
    }
}

/// Transitions over [`WorkflowState`].
#[derive(Debug, Clone)]
pub enum WorkflowAction<Tgt, P> {
    /// Record targets and params; the phase stays `Pending`.
    Start { targets: Vec<Tgt>, params: P },
    Perform,
    Finish { results: Vec<OperationResult<Tgt>> },
    Reset,
}

impl<Tgt, P> Action for WorkflowAction<Tgt, P> {
    fn kind(&self) -> &'static str {
        match self {
            WorkflowAction::Start { .. } => "WorkflowStart",
            WorkflowAction::Perform => "WorkflowPerform",
            WorkflowAction::Finish { .. } => "WorkflowFinish",
            WorkflowAction::Reset => "WorkflowReset",
        }
    }
}

/// Reducer for one workflow instance.
///
/// The reducer stays total: transitions that are illegal from the current
/// phase leave the state untouched, so a malformed dispatch cannot corrupt
/// anything. The typed guard errors live on [`WorkflowActions`].
pub struct WorkflowReducer<Tgt, P> {
    _marker: PhantomData<fn() -> (Tgt, P)>,
}

impl<Tgt, P> WorkflowReducer<Tgt, P> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<Tgt, P> Default for WorkflowReducer<Tgt, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tgt, P> Reducer<WorkflowState<Tgt, P>> for WorkflowReducer<Tgt, P>
where
    Tgt: Clone + Send + Sync,
    P: Clone + Send + Sync,
{
    type Action = WorkflowAction<Tgt, P>;

    fn initial(&self) -> WorkflowState<Tgt, P> {
        WorkflowState::pending()
    }

    fn reduce(
        &self,
        mut state: WorkflowState<Tgt, P>,
        action: &WorkflowAction<Tgt, P>,
    ) -> WorkflowState<Tgt, P> {
        match action {
            WorkflowAction::Start { targets, params }
                if state.operation == OperationState::Pending =>
            {
                state.targets = targets.clone();
                state.params = Some(params.clone());
                state.results.clear();
            }
            WorkflowAction::Perform if state.operation == OperationState::Pending => {
                state.operation = OperationState::Performing;
            }
            WorkflowAction::Finish { results }
                if state.operation == OperationState::Performing =>
            {
                state.operation = OperationState::Done;
                state.results = results.clone();
            }
            WorkflowAction::Reset => {
                state = WorkflowState::pending();
            }
            _ => {}
        }
        state
    }
}

/// Lifecycle edges hooks can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowTrigger {
    Start,
    Perform,
    Done,
    Reset,
}

/// Callback run on a workflow lifecycle edge.
///
/// The `Done` hook is how feature modules implement "navigate back to the
/// list on success" or "re-poll a related list": it receives the finished
/// snapshot and the store, so it can dispatch further fetches or resets.
#[async_trait]
pub trait WorkflowHook<Tgt, P, S, A>: Send + Sync {
    async fn run(&self, state: WorkflowState<Tgt, P>, store: Arc<Store<S, A>>);
}

/// Dispatchable operation bundle for one workflow instance.
///
/// `start` records targets and params, `perform` runs the injected executor
/// and stores the per-target results, `reset` returns to `Pending`. Illegal
/// calls are rejected with typed errors instead of being silently ignored:
/// a `Performing` workflow cannot be started or performed again, and a
/// `Done` workflow must be reset first.
pub struct WorkflowActions<R, Tgt, P, S, A>
where
    R: Resource,
{
    store: Arc<Store<S, A>>,
    slice: Arc<dyn Fn(&S) -> &WorkflowState<Tgt, P> + Send + Sync>,
    executor: Arc<dyn OperationExecutor<Tgt, P>>,
    hooks: HashMap<WorkflowTrigger, Arc<dyn WorkflowHook<Tgt, P, S, A>>>,
    performing: Arc<AtomicBool>,
    _resource: PhantomData<R>,
}

impl<R: Resource, Tgt, P, S, A> Clone for WorkflowActions<R, Tgt, P, S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            slice: Arc::clone(&self.slice),
            executor: Arc::clone(&self.executor),
            hooks: self.hooks.clone(),
            performing: Arc::clone(&self.performing),
            _resource: PhantomData,
        }
    }
}

impl<R, Tgt, P, S, A> WorkflowActions<R, Tgt, P, S, A>
where
    R: Resource,
    Tgt: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
    A: Action + From<WorkflowAction<Tgt, P>> + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<Store<S, A>>,
        slice: impl Fn(&S) -> &WorkflowState<Tgt, P> + Send + Sync + 'static,
        executor: impl OperationExecutor<Tgt, P> + 'static,
    ) -> Self {
        Self {
            store,
            slice: Arc::new(slice),
            executor: Arc::new(executor),
            hooks: HashMap::new(),
            performing: Arc::new(AtomicBool::new(false)),
            _resource: PhantomData,
        }
    }

    /// Register a hook for one lifecycle trigger, replacing any previous
    /// hook on the same trigger.
    pub fn with_hook(
        mut self,
        trigger: WorkflowTrigger,
        hook: impl WorkflowHook<Tgt, P, S, A> + 'static,
    ) -> Self {
        self.hooks.insert(trigger, Arc::new(hook));
        self
    }

    /// Shorthand for the `Done` hook.
    pub fn on_done(self, hook: impl WorkflowHook<Tgt, P, S, A> + 'static) -> Self {
        self.with_hook(WorkflowTrigger::Done, hook)
    }

    pub fn store(&self) -> &Arc<Store<S, A>> {
        &self.store
    }

    /// Snapshot this workflow's slice.
    pub fn slice_state(&self) -> WorkflowState<Tgt, P> {
        self.store.with_state(|state| (self.slice)(state).clone())
    }

    fn dispatch(&self, action: WorkflowAction<Tgt, P>) {
        self.store.dispatch(A::from(action));
    }

    async fn run_hook(&self, trigger: WorkflowTrigger) {
        if let Some(hook) = self.hooks.get(&trigger) {
            hook.run(self.slice_state(), Arc::clone(&self.store)).await;
        }
    }

    /// Record targets and params without changing the phase.
    pub async fn start(&self, targets: Vec<Tgt>, params: P) -> Result<(), Error> {
        match self.slice_state().operation {
            OperationState::Pending => {}
            OperationState::Performing => return Err(Error::AlreadyPerforming),
            OperationState::Done => return Err(Error::NotReset),
        }
        self.dispatch(WorkflowAction::Start { targets, params });
        self.run_hook(WorkflowTrigger::Start).await;
        Ok(())
    }

    /// Run the injected executor against the recorded targets.
    ///
    /// The workflow enters `Performing` immediately and `Done` once the
    /// executor resolves. An executor that rejects outright (instead of
    /// encoding per-target failures in its results) is converted into an
    /// all-failed result set, so the workflow can never get stuck in
    /// `Performing`.
    ///
    /// The executor runs at most once per cycle even when two tasks race
    /// into `perform` on clones of the same bundle: an atomic claim backs
    /// the state check, and the loser gets `Error::AlreadyPerforming`.
    pub async fn perform(&self) -> Result<Vec<OperationResult<Tgt>>, Error> {
        let snapshot = self.slice_state();
        match snapshot.operation {
            OperationState::Pending => {}
            OperationState::Performing => return Err(Error::AlreadyPerforming),
            OperationState::Done => return Err(Error::NotReset),
        }
        if snapshot.targets.is_empty() {
            return Err(Error::NoTargets);
        }
        let params = snapshot.params.clone().ok_or(Error::NoTargets)?;

        if self.performing.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyPerforming);
        }

        self.dispatch(WorkflowAction::Perform);
        self.run_hook(WorkflowTrigger::Perform).await;

        let results = match self.executor.execute(&snapshot.targets, &params).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(
                    resource = R::NAME,
                    error = %err,
                    "operation executor rejected; recording every target as failed"
                );
                let shared = SharedError::new(err);
                snapshot
                    .targets
                    .iter()
                    .cloned()
                    .map(|target| OperationResult::failed(target, shared.clone()))
                    .collect()
            }
        };

        self.dispatch(WorkflowAction::Finish {
            results: results.clone(),
        });
        // Released only after Finish: a late racer now sees Done (NotReset).
        self.performing.store(false, Ordering::SeqCst);
        self.run_hook(WorkflowTrigger::Done).await;
        Ok(results)
    }

    /// Return to `Pending`, clearing targets and results.
    pub async fn reset(&self) {
        self.dispatch(WorkflowAction::Reset);
        self.run_hook(WorkflowTrigger::Reset).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reducer_only_moves_forward() {
        let r = WorkflowReducer::<String, ()>::new();
        let mut state = r.initial();

        state = r.reduce(
            state,
            &WorkflowAction::Start {
                targets: vec!["a".into()],
                params: (),
            },
        );
        assert_eq!(state.operation, OperationState::Pending);
        assert_eq!(state.targets, vec!["a"]);

        state = r.reduce(state, &WorkflowAction::Perform);
        assert_eq!(state.operation, OperationState::Performing);

        // A second Start while performing is ignored.
        let ignored = r.reduce(
            state.clone(),
            &WorkflowAction::Start {
                targets: vec!["b".into()],
                params: (),
            },
        );
        assert_eq!(ignored.targets, vec!["a"]);

        state = r.reduce(
            state,
            &WorkflowAction::Finish {
                results: vec![OperationResult::succeeded("a".to_string())],
            },
        );
        assert_eq!(state.operation, OperationState::Done);
        assert!(state.is_success());

        state = r.reduce(state, &WorkflowAction::Reset);
        assert_eq!(state.operation, OperationState::Pending);
        assert!(state.targets.is_empty());
        assert!(state.results.is_empty());
    }

    #[test]
    fn finish_outside_performing_is_ignored() {
        let r = WorkflowReducer::<String, ()>::new();
        let state = r.reduce(
            r.initial(),
            &WorkflowAction::Finish {
                results: vec![OperationResult::succeeded("a".to_string())],
            },
        );
        assert_eq!(state.operation, OperationState::Pending);
        assert!(state.results.is_empty());
    }

    #[test]
    fn partial_failure_is_not_success() {
        let mut state = WorkflowState::<String, ()>::pending();
        state.operation = OperationState::Done;
        state.results = vec![
            OperationResult::succeeded("a".to_string()),
            OperationResult::failed(
                "b".to_string(),
                SharedError::new(anyhow::anyhow!("forbidden")),
            ),
        ];
        assert!(!state.is_success());
        assert_eq!(state.failed_targets().count(), 1);
    }

    #[test]
    fn pending_workflow_is_not_success() {
        let state = WorkflowState::<String, ()>::pending();
        assert!(!state.is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_performs_run_the_executor_once() {
        use std::sync::atomic::AtomicU32;
        use std::time::Duration;

        struct CountingExecutor {
            executions: Arc<AtomicU32>,
        }

        #[async_trait]
        impl OperationExecutor<String, ()> for CountingExecutor {
            async fn execute(
                &self,
                targets: &[String],
                _params: &(),
            ) -> anyhow::Result<Vec<OperationResult<String>>> {
                self.executions.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(targets
                    .iter()
                    .cloned()
                    .map(OperationResult::succeeded)
                    .collect())
            }
        }

        struct Removal;

        impl Resource for Removal {
            const NAME: &'static str = "removal";
        }

        let executions = Arc::new(AtomicU32::new(0));
        let store = Arc::new(Store::new(WorkflowReducer::<String, ()>::new()));
        let actions: WorkflowActions<
            Removal,
            String,
            (),
            WorkflowState<String, ()>,
            WorkflowAction<String, ()>,
        > = WorkflowActions::new(
            Arc::clone(&store),
            |s: &WorkflowState<String, ()>| s,
            CountingExecutor {
                executions: Arc::clone(&executions),
            },
        );

        actions.start(vec!["a".to_string()], ()).await.unwrap();

        let first = tokio::spawn({
            let actions = actions.clone();
            async move { actions.perform().await }
        });
        let second = tokio::spawn({
            let actions = actions.clone();
            async move { actions.perform().await }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, Err(Error::AlreadyPerforming | Error::NotReset))));
        assert_eq!(actions.slice_state().operation, OperationState::Done);
    }
}
