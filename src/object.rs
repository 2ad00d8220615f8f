//! Object action set: the single-object analogue of the list bundle. No
//! paging merge and no selection; the query's filter still describes which
//! object to load.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::action::{Action, Resource};
use crate::contracts::{FetchHook, ObjectFetcher};
use crate::error::SharedError;
use crate::fetcher::{FetchTrigger, FetcherState, ObjectFetcherReducer};
use crate::polling::{self, PollHandle, PollTarget, PollingConfig};
use crate::query::{Merge, QueryAction, QueryReducer, QueryState};
use crate::store::{Reducer, Store};

/// Composed state slice for one single-object target.
#[derive(Debug, Clone)]
pub struct ObjectState<F, T> {
    pub query: QueryState<F>,
    pub fetcher: FetcherState<T>,
}

/// Actions over one object slice.
#[derive(Debug, Clone)]
pub enum ObjectAction<F, T> {
    Query(QueryAction<F>),
    Fetch(FetchTrigger<T>),
}

impl<F, T> Action for ObjectAction<F, T> {
    fn kind(&self) -> &'static str {
        match self {
            ObjectAction::Query(action) => action.kind(),
            ObjectAction::Fetch(trigger) => trigger.kind(),
        }
    }
}

impl<F, T> From<QueryAction<F>> for ObjectAction<F, T> {
    fn from(action: QueryAction<F>) -> Self {
        ObjectAction::Query(action)
    }
}

impl<F, T> From<FetchTrigger<T>> for ObjectAction<F, T> {
    fn from(trigger: FetchTrigger<T>) -> Self {
        ObjectAction::Fetch(trigger)
    }
}

/// Reducer composing query and fetcher for one object target.
pub struct ObjectReducer<F, T> {
    query: QueryReducer<F>,
    fetcher: ObjectFetcherReducer<T>,
}

impl<F: Clone, T: Clone> ObjectReducer<F, T> {
    /// `empty` is the placeholder value shown before the first load.
    pub fn new(initial_query: QueryState<F>, empty: T) -> Self {
        Self {
            query: QueryReducer::new(initial_query),
            fetcher: ObjectFetcherReducer::new(empty),
        }
    }
}

impl<F, T> Reducer<ObjectState<F, T>> for ObjectReducer<F, T>
where
    F: Merge + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    type Action = ObjectAction<F, T>;

    fn initial(&self) -> ObjectState<F, T> {
        ObjectState {
            query: self.query.initial(),
            fetcher: self.fetcher.initial(),
        }
    }

    fn reduce(&self, mut state: ObjectState<F, T>, action: &ObjectAction<F, T>) -> ObjectState<F, T> {
        match action {
            ObjectAction::Query(action) => {
                state.query = self.query.reduce(state.query, action);
            }
            ObjectAction::Fetch(trigger) => {
                state.fetcher = self.fetcher.reduce(state.fetcher, trigger);
            }
        }
        state
    }
}

/// Dispatchable operation bundle for one single-object target.
///
/// Same fetch wrapper discipline as the list bundle: first load through
/// `Start`, refreshes through `Loading`, stale completions dropped via a
/// sequence ticket without running the `on_finish` hook.
pub struct ObjectActions<R, F, T, S, A>
where
    R: Resource,
{
    store: Arc<Store<S, A>>,
    slice: Arc<dyn Fn(&S) -> &ObjectState<F, T> + Send + Sync>,
    fetcher: Arc<dyn ObjectFetcher<F, T>>,
    on_finish: Option<Arc<dyn FetchHook<S, A, T>>>,
    seq: Arc<AtomicU64>,
    poll_handle: Arc<Mutex<Option<PollHandle>>>,
    _resource: PhantomData<R>,
}

impl<R: Resource, F, T, S, A> Clone for ObjectActions<R, F, T, S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            slice: Arc::clone(&self.slice),
            fetcher: Arc::clone(&self.fetcher),
            on_finish: self.on_finish.clone(),
            seq: Arc::clone(&self.seq),
            poll_handle: Arc::clone(&self.poll_handle),
            _resource: PhantomData,
        }
    }
}

impl<R, F, T, S, A> ObjectActions<R, F, T, S, A>
where
    R: Resource,
    F: Merge + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
    A: Action + From<ObjectAction<F, T>> + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<Store<S, A>>,
        slice: impl Fn(&S) -> &ObjectState<F, T> + Send + Sync + 'static,
        fetcher: impl ObjectFetcher<F, T> + 'static,
    ) -> Self {
        Self {
            store,
            slice: Arc::new(slice),
            fetcher: Arc::new(fetcher),
            on_finish: None,
            seq: Arc::new(AtomicU64::new(0)),
            poll_handle: Arc::new(Mutex::new(None)),
            _resource: PhantomData,
        }
    }

    /// Attach the hook that runs after every completed fetch.
    pub fn with_on_finish(mut self, hook: impl FetchHook<S, A, T> + 'static) -> Self {
        self.on_finish = Some(Arc::new(hook));
        self
    }

    pub fn store(&self) -> &Arc<Store<S, A>> {
        &self.store
    }

    /// Snapshot this object's slice.
    pub fn slice_state(&self) -> ObjectState<F, T> {
        self.store.with_state(|state| (self.slice)(state).clone())
    }

    fn dispatch(&self, action: ObjectAction<F, T>) {
        self.store.dispatch(A::from(action));
    }

    /// Fetch using the current query description.
    pub async fn fetch(&self) -> Result<T, SharedError> {
        let ticket = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let (query, fetched) = self.store.with_state(|state| {
            let slice = (self.slice)(state);
            (slice.query.clone(), slice.fetcher.fetched)
        });
        let trigger = if fetched {
            FetchTrigger::Loading
        } else {
            FetchTrigger::Start
        };
        self.dispatch(ObjectAction::Fetch(trigger));

        let outcome = self.fetcher.fetch(&query).await;

        if self.seq.load(Ordering::SeqCst) != ticket {
            tracing::warn!(resource = R::NAME, ticket, "dropping stale object fetch response");
            return outcome.map_err(SharedError::new);
        }

        match outcome {
            Ok(data) => {
                self.dispatch(ObjectAction::Fetch(FetchTrigger::Done {
                    page_index: query.paging.page_index,
                    append: false,
                    clear: query.paging.clear,
                    data: data.clone(),
                }));
                self.run_on_finish(Ok(data.clone())).await;
                Ok(data)
            }
            Err(err) => {
                let err = SharedError::new(err);
                tracing::debug!(resource = R::NAME, error = %err, "object fetch failed");
                self.dispatch(ObjectAction::Fetch(FetchTrigger::Fail {
                    page_index: query.paging.page_index,
                    append: false,
                    clear: query.paging.clear,
                    error: err.clone(),
                }));
                self.run_on_finish(Err(err.clone())).await;
                Err(err)
            }
        }
    }

    async fn run_on_finish(&self, outcome: Result<T, SharedError>) {
        if let Some(hook) = &self.on_finish {
            hook.on_finish(outcome, Arc::clone(&self.store)).await;
        }
    }

    /// Re-run the current query unchanged.
    pub async fn refetch(&self) -> Result<T, SharedError> {
        self.fetch().await
    }

    /// Drop the fetched object and return to the placeholder value.
    pub fn clear_fetch(&self) {
        self.dispatch(ObjectAction::Fetch(FetchTrigger::Clear));
    }

    /// Overwrite the object locally without touching fetch bookkeeping.
    pub fn update(&self, data: T) {
        self.dispatch(ObjectAction::Fetch(FetchTrigger::Update(data)));
    }

    /// Merge a filter patch and refetch.
    pub async fn apply_filter(&self, patch: F) -> Result<T, SharedError> {
        self.dispatch(ObjectAction::Query(QueryAction::ApplyFilter(patch)));
        self.fetch().await
    }

    /// Merge a filter patch without refetching.
    pub fn change_filter(&self, patch: F) {
        self.dispatch(ObjectAction::Query(QueryAction::ChangeFilter(patch)));
    }

    /// Merge a poll-driven filter patch and refetch.
    pub async fn apply_polling(&self, patch: F) -> Result<(), SharedError> {
        self.dispatch(ObjectAction::Query(QueryAction::ApplyPolling(patch)));
        self.fetch().await.map(|_| ())
    }

    /// Restore the declared initial query without refetching.
    pub fn reset_query(&self) {
        self.dispatch(ObjectAction::Query(QueryAction::Reset));
    }

    /// A poll target that re-applies `filter` and refetches on every tick.
    pub fn polling(&self, filter: F) -> ObjectPollTarget<R, F, T, S, A> {
        ObjectPollTarget {
            actions: self.clone(),
            filter,
        }
    }

    /// Start polling this object, replacing any poll loop this bundle
    /// already runs (idempotent restart).
    pub fn start_polling(
        &self,
        filter: F,
        config: PollingConfig,
        on_error: impl FnOnce() + Send + 'static,
    ) {
        let handle = polling::start_polling(self.polling(filter), config, on_error);
        let mut slot = self
            .poll_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.cancel();
        }
    }

    /// Stop this bundle's poll loop. Safe to call when none is running.
    pub fn clear_polling(&self) {
        let handle = self
            .poll_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }
}

/// [`PollTarget`] over an object bundle and a bound poll filter.
pub struct ObjectPollTarget<R, F, T, S, A>
where
    R: Resource,
{
    actions: ObjectActions<R, F, T, S, A>,
    filter: F,
}

#[async_trait]
impl<R, F, T, S, A> PollTarget for ObjectPollTarget<R, F, T, S, A>
where
    R: Resource,
    F: Merge + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
    A: Action + From<ObjectAction<F, T>> + Send + Sync + 'static,
{
    async fn poll(&self) -> Result<(), SharedError> {
        self.actions.apply_polling(self.filter.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::time;

    struct ClusterDetail;

    impl Resource for ClusterDetail {
        const NAME: &'static str = "cluster_detail";
    }

    type TestState = ObjectState<Value, Option<String>>;
    type TestAction = ObjectAction<Value, Option<String>>;
    type TestActions = ObjectActions<ClusterDetail, Value, Option<String>, TestState, TestAction>;

    fn store() -> Arc<Store<TestState, TestAction>> {
        Arc::new(Store::new(ObjectReducer::new(
            QueryState::new(1, json!({})),
            None,
        )))
    }

    /// Resolves to the name in the filter, slowly.
    struct FilterEcho {
        delay: Duration,
    }

    #[async_trait]
    impl ObjectFetcher<Value, Option<String>> for FilterEcho {
        async fn fetch(&self, query: &QueryState<Value>) -> anyhow::Result<Option<String>> {
            time::sleep(self.delay).await;
            let name = query
                .filter
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("no object selected"))?;
            Ok(Some(name.to_string()))
        }
    }

    #[tokio::test]
    async fn apply_filter_fetches_the_selected_object() {
        let actions = TestActions::new(
            store(),
            |s| s,
            FilterEcho {
                delay: Duration::ZERO,
            },
        );

        let fetched = actions.apply_filter(json!({"name": "cluster-a"})).await.unwrap();
        assert_eq!(fetched.as_deref(), Some("cluster-a"));

        let slice = actions.slice_state();
        assert_eq!(slice.fetcher.data.as_deref(), Some("cluster-a"));
        assert!(slice.fetcher.fetched);
    }

    #[tokio::test]
    async fn fetch_without_selection_fails_and_keeps_placeholder() {
        let actions = TestActions::new(
            store(),
            |s| s,
            FilterEcho {
                delay: Duration::ZERO,
            },
        );

        let err = actions.fetch().await.unwrap_err();
        assert!(err.to_string().contains("no object selected"));

        let slice = actions.slice_state();
        assert!(slice.fetcher.is_failed());
        assert_eq!(slice.fetcher.data, None);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_data_visible_while_loading() {
        let actions = TestActions::new(
            store(),
            |s| s,
            FilterEcho {
                delay: Duration::from_secs(1),
            },
        );

        actions.apply_filter(json!({"name": "cluster-a"})).await.unwrap();

        let refresh = tokio::spawn({
            let actions = actions.clone();
            async move { actions.refetch().await }
        });
        tokio::task::yield_now().await;

        let slice = actions.slice_state();
        assert!(slice.fetcher.is_fetching());
        assert!(slice.fetcher.loading);
        assert_eq!(slice.fetcher.data.as_deref(), Some("cluster-a"));

        refresh.await.unwrap().unwrap();
        let slice = actions.slice_state();
        assert!(!slice.fetcher.loading);
        assert_eq!(slice.fetcher.data.as_deref(), Some("cluster-a"));
    }

    #[tokio::test]
    async fn update_overwrites_locally() {
        let actions = TestActions::new(
            store(),
            |s| s,
            FilterEcho {
                delay: Duration::ZERO,
            },
        );

        actions.update(Some("draft".to_string()));
        let slice = actions.slice_state();
        assert_eq!(slice.fetcher.data.as_deref(), Some("draft"));
        assert!(!slice.fetcher.fetched);
    }
}
