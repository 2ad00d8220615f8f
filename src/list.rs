//! List action set: the dispatchable operation bundle for one resource
//! collection, wiring the query/fetcher/selection reducers to an injected
//! transport.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::action::{Action, Resource};
use crate::contracts::{FetchHook, ListFetcher};
use crate::error::SharedError;
use crate::fetcher::{FetchTrigger, FetcherState, ListFetcherReducer, RecordSet};
use crate::polling::{self, PollHandle, PollTarget, PollingConfig};
use crate::query::{Merge, Paging, QueryAction, QueryReducer, QueryState, SortSpec};
use crate::selection::Selection;
use crate::store::{Reducer, Store};

/// Composed state slice for one resource collection.
#[derive(Debug, Clone)]
pub struct ListState<F, T> {
    pub query: QueryState<F>,
    pub fetcher: FetcherState<RecordSet<T>>,
    pub selection: Selection<T>,
}

impl<F, T> ListState<F, T> {
    pub fn records(&self) -> &[T] {
        &self.fetcher.data.records
    }
}

/// Actions over one collection slice.
#[derive(Debug, Clone)]
pub enum ListAction<F, T> {
    Query(QueryAction<F>),
    Fetch(FetchTrigger<RecordSet<T>>),
    Select(T),
    Deselect(T),
    SelectAll,
    ClearSelection,
}

impl<F, T> Action for ListAction<F, T> {
    fn kind(&self) -> &'static str {
        match self {
            ListAction::Query(action) => action.kind(),
            ListAction::Fetch(trigger) => trigger.kind(),
            ListAction::Select(_) => "Select",
            ListAction::Deselect(_) => "Deselect",
            ListAction::SelectAll => "SelectAll",
            ListAction::ClearSelection => "ClearSelection",
        }
    }
}

impl<F, T> From<QueryAction<F>> for ListAction<F, T> {
    fn from(action: QueryAction<F>) -> Self {
        ListAction::Query(action)
    }
}

impl<F, T> From<FetchTrigger<RecordSet<T>>> for ListAction<F, T> {
    fn from(trigger: FetchTrigger<RecordSet<T>>) -> Self {
        ListAction::Fetch(trigger)
    }
}

/// Reducer composing query, fetcher, and selection for one collection.
pub struct ListReducer<F, T> {
    query: QueryReducer<F>,
    fetcher: ListFetcherReducer<T>,
}

impl<F: Clone, T: Clone> ListReducer<F, T> {
    pub fn new(initial_query: QueryState<F>) -> Self {
        Self {
            query: QueryReducer::new(initial_query),
            fetcher: ListFetcherReducer::new(),
        }
    }

    pub fn with_empty(initial_query: QueryState<F>, empty: RecordSet<T>) -> Self {
        Self {
            query: QueryReducer::new(initial_query),
            fetcher: ListFetcherReducer::with_empty(empty),
        }
    }
}

impl<F, T> Reducer<ListState<F, T>> for ListReducer<F, T>
where
    F: Merge + Clone + Send + Sync,
    T: Clone + PartialEq + Send + Sync,
{
    type Action = ListAction<F, T>;

    fn initial(&self) -> ListState<F, T> {
        ListState {
            query: self.query.initial(),
            fetcher: self.fetcher.initial(),
            selection: Selection::new(),
        }
    }

    fn reduce(&self, mut state: ListState<F, T>, action: &ListAction<F, T>) -> ListState<F, T> {
        match action {
            ListAction::Query(action) => {
                state.query = self.query.reduce(state.query, action);
            }
            ListAction::Fetch(trigger) => {
                state.fetcher = self.fetcher.reduce(state.fetcher, trigger);
            }
            ListAction::Select(item) => {
                let ListState {
                    fetcher, selection, ..
                } = &mut state;
                selection.select(&fetcher.data.records, item);
            }
            ListAction::Deselect(item) => {
                state.selection.deselect(item);
            }
            ListAction::SelectAll => {
                let ListState {
                    fetcher, selection, ..
                } = &mut state;
                selection.select_all(&fetcher.data.records);
            }
            ListAction::ClearSelection => {
                state.selection.clear();
            }
        }
        state
    }
}

/// Dispatchable operation bundle for one resource collection.
///
/// Built from a store, a state accessor for this collection's slice, and an
/// injected [`ListFetcher`]. Filter, search, sort, and paging operations
/// dispatch their query action and immediately refetch, so "filter changes
/// always refetch" comes for free; the `change_*` variants update the view
/// description only.
///
/// Every fetch takes a sequence ticket; a completion whose ticket is no
/// longer the latest is dropped, so an out-of-order response can never
/// overwrite a newer request's result.
pub struct ListActions<R, F, T, S, A>
where
    R: Resource,
{
    store: Arc<Store<S, A>>,
    slice: Arc<dyn Fn(&S) -> &ListState<F, T> + Send + Sync>,
    fetcher: Arc<dyn ListFetcher<F, T>>,
    on_finish: Option<Arc<dyn FetchHook<S, A, RecordSet<T>>>>,
    seq: Arc<AtomicU64>,
    poll_handle: Arc<Mutex<Option<PollHandle>>>,
    _resource: PhantomData<R>,
}

impl<R: Resource, F, T, S, A> Clone for ListActions<R, F, T, S, A> {
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

impl<R, F, T, S, A> ListActions<R, F, T, S, A>
where
    R: Resource,
    F: Merge + Clone + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
    A: Action + From<ListAction<F, T>> + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<Store<S, A>>,
        slice: impl Fn(&S) -> &ListState<F, T> + Send + Sync + 'static,
        fetcher: impl ListFetcher<F, T> + 'static,
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
    pub fn with_on_finish(mut self, hook: impl FetchHook<S, A, RecordSet<T>> + 'static) -> Self {
        self.on_finish = Some(Arc::new(hook));
        self
    }

    pub fn store(&self) -> &Arc<Store<S, A>> {
        &self.store
    }

    /// Snapshot this collection's slice.
    pub fn slice_state(&self) -> ListState<F, T> {
        self.store.with_state(|state| (self.slice)(state).clone())
    }

    fn dispatch(&self, action: ListAction<F, T>) {
        self.store.dispatch(A::from(action));
    }

    /// Fetch using the current query description.
    ///
    /// The first load dispatches `Start`; once data has been fetched,
    /// refreshes go through `Loading` so existing records stay visible. The
    /// resolved value is also applied to state, unless a newer fetch was
    /// issued meanwhile; a dropped completion does not run the `on_finish`
    /// hook either.
    pub async fn fetch(&self) -> Result<RecordSet<T>, SharedError> {
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
        self.dispatch(ListAction::Fetch(trigger));

        let page_index = query.paging.page_index;
        let append = query.paging.append;
        let clear = query.paging.clear;
        let outcome = self.fetcher.fetch(&query).await;

        if self.seq.load(Ordering::SeqCst) != ticket {
            tracing::warn!(resource = R::NAME, ticket, "dropping stale list fetch response");
            return outcome.map_err(SharedError::new);
        }

        match outcome {
            Ok(data) => {
                self.dispatch(ListAction::Query(QueryAction::ChangeContinueToken(
                    data.continue_token.clone(),
                )));
                self.dispatch(ListAction::Fetch(FetchTrigger::Done {
                    page_index,
                    append,
                    clear,
                    data: data.clone(),
                }));
                self.run_on_finish(Ok(data.clone())).await;
                Ok(data)
            }
            Err(err) => {
                let err = SharedError::new(err);
                tracing::debug!(resource = R::NAME, error = %err, "list fetch failed");
                self.dispatch(ListAction::Fetch(FetchTrigger::Fail {
                    page_index,
                    append,
                    clear,
                    error: err.clone(),
                }));
                self.run_on_finish(Err(err.clone())).await;
                Err(err)
            }
        }
    }

    async fn run_on_finish(&self, outcome: Result<RecordSet<T>, SharedError>) {
        if let Some(hook) = &self.on_finish {
            hook.on_finish(outcome, Arc::clone(&self.store)).await;
        }
    }

    /// Re-run the current query unchanged.
    pub async fn refetch(&self) -> Result<RecordSet<T>, SharedError> {
        self.fetch().await
    }

    /// Drop all fetched data and page bookkeeping.
    pub fn clear_fetch(&self) {
        self.dispatch(ListAction::Fetch(FetchTrigger::Clear));
    }

    /// Overwrite the visible records without touching fetch bookkeeping.
    pub fn update(&self, data: RecordSet<T>) {
        self.dispatch(ListAction::Fetch(FetchTrigger::Update(data)));
    }

    /// Merge a filter patch and refetch from page one.
    pub async fn apply_filter(&self, patch: F) -> Result<RecordSet<T>, SharedError> {
        self.dispatch(ListAction::Query(QueryAction::ApplyFilter(patch)));
        self.fetch().await
    }

    /// Merge a filter patch without refetching.
    pub fn change_filter(&self, patch: F) {
        self.dispatch(ListAction::Query(QueryAction::ChangeFilter(patch)));
    }

    /// Merge a poll-driven filter patch and refetch, preserving pagination.
    pub async fn apply_polling(&self, patch: F) -> Result<(), SharedError> {
        self.dispatch(ListAction::Query(QueryAction::ApplyPolling(patch)));
        self.fetch().await.map(|_| ())
    }

    /// Commit the keyword as the active search and refetch from page one.
    pub async fn perform_search(
        &self,
        keyword: impl Into<String>,
    ) -> Result<RecordSet<T>, SharedError> {
        self.dispatch(ListAction::Query(QueryAction::PerformSearch(keyword.into())));
        self.fetch().await
    }

    /// Update the live keyword without committing a search.
    pub fn change_keyword(&self, keyword: impl Into<String>) {
        self.dispatch(ListAction::Query(QueryAction::ChangeKeyword(keyword.into())));
    }

    /// Merge a structured-search patch and refetch from page one.
    pub async fn apply_search_filter(&self, patch: F) -> Result<RecordSet<T>, SharedError> {
        self.dispatch(ListAction::Query(QueryAction::ApplySearchFilter(patch)));
        self.fetch().await
    }

    /// Merge a structured-search patch without refetching.
    pub fn change_search_filter(&self, patch: F) {
        self.dispatch(ListAction::Query(QueryAction::ChangeSearchFilter(patch)));
    }

    /// Change the sort spec and refetch.
    pub async fn sort_by(&self, sort: SortSpec) -> Result<RecordSet<T>, SharedError> {
        self.dispatch(ListAction::Query(QueryAction::SortBy(sort)));
        self.fetch().await
    }

    /// Move the paging cursor and refetch.
    pub async fn change_paging(&self, paging: Paging) -> Result<RecordSet<T>, SharedError> {
        self.dispatch(ListAction::Query(QueryAction::ChangePaging(paging)));
        self.fetch().await
    }

    /// Jump to a page and refetch.
    pub async fn change_paging_index(&self, index: u32) -> Result<RecordSet<T>, SharedError> {
        self.dispatch(ListAction::Query(QueryAction::ChangePagingIndex(index)));
        self.fetch().await
    }

    /// Load the next page in append (infinite-scroll) mode.
    pub async fn next_page(&self) -> Result<RecordSet<T>, SharedError> {
        self.dispatch(ListAction::Query(QueryAction::NextPage));
        self.fetch().await
    }

    /// Restore the declared initial paging without refetching.
    pub fn reset_paging(&self) {
        self.dispatch(ListAction::Query(QueryAction::ResetPaging));
    }

    /// Restore the declared initial query without refetching.
    pub fn reset_query(&self) {
        self.dispatch(ListAction::Query(QueryAction::Reset));
    }

    pub fn select(&self, item: T) {
        self.dispatch(ListAction::Select(item));
    }

    pub fn deselect(&self, item: T) {
        self.dispatch(ListAction::Deselect(item));
    }

    pub fn select_all(&self) {
        self.dispatch(ListAction::SelectAll);
    }

    pub fn clear_selection(&self) {
        self.dispatch(ListAction::ClearSelection);
    }

    /// A poll target that re-applies `filter` and refetches on every tick.
    pub fn polling(&self, filter: F) -> ListPollTarget<R, F, T, S, A> {
        ListPollTarget {
            actions: self.clone(),
            filter,
        }
    }

    /// Start polling this collection, replacing any poll loop this bundle
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

/// [`PollTarget`] over a list bundle and a bound poll filter.
pub struct ListPollTarget<R, F, T, S, A>
where
    R: Resource,
{
    actions: ListActions<R, F, T, S, A>,
    filter: F,
}

#[async_trait]
impl<R, F, T, S, A> PollTarget for ListPollTarget<R, F, T, S, A>
where
    R: Resource,
    F: Merge + Clone + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
    A: Action + From<ListAction<F, T>> + Send + Sync + 'static,
{
    async fn poll(&self) -> Result<(), SharedError> {
        self.actions.apply_polling(self.filter.clone()).await
    }
}
