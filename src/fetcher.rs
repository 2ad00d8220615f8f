//! Fetch lifecycle state for one target (a single object or a paged list)
//! and the pure reducers that drive it.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::SharedError;
use crate::store::Reducer;

/// Lifecycle phase of a fetch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchPhase {
    Ready,
    Fetching,
    Failed,
}

/// A page or full result of a list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet<T> {
    /// Server-reported total across all pages, not the length of `records`.
    pub record_count: usize,
    pub records: Vec<T>,
    /// Continuation token for incremental loads, when the backend pages that
    /// way. Fed back into `QueryState.continue_token` by the fetch wrapper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
}

impl<T> RecordSet<T> {
    pub fn new(record_count: usize, records: Vec<T>) -> Self {
        Self {
            record_count,
            records,
            continue_token: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T> Default for RecordSet<T> {
    fn default() -> Self {
        Self::new(0, Vec::new())
    }
}

impl<T> FromIterator<T> for RecordSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let records: Vec<T> = iter.into_iter().collect();
        Self::new(records.len(), records)
    }
}

/// Per-page snapshot kept by list fetchers so paged or appended loads can be
/// merged without discarding earlier pages.
#[derive(Debug, Clone)]
pub struct PageState<T> {
    pub phase: FetchPhase,
    pub fetched: bool,
    pub loading: bool,
    pub data: T,
    pub error: Option<SharedError>,
}

impl<T> PageState<T> {
    fn untouched(data: T) -> Self {
        Self {
            phase: FetchPhase::Ready,
            fetched: false,
            loading: false,
            data,
            error: None,
        }
    }
}

/// Async-load lifecycle and cached result for one fetch target.
///
/// `fetched` records whether any attempt has ever completed (success or
/// failure) and only [`FetchTrigger::Clear`] reverts it; `loading`
/// distinguishes a background refresh of already-populated data from a first
/// load. `pages` is maintained by the list reducer only.
#[derive(Debug, Clone)]
pub struct FetcherState<T> {
    pub phase: FetchPhase,
    pub data: T,
    pub fetched: bool,
    pub loading: bool,
    pub error: Option<SharedError>,
    pub pages: Vec<PageState<T>>,
}

impl<T> FetcherState<T> {
    pub fn empty(data: T) -> Self {
        Self {
            phase: FetchPhase::Ready,
            data,
            fetched: false,
            loading: false,
            error: None,
            pages: Vec::new(),
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.phase == FetchPhase::Fetching
    }

    pub fn is_failed(&self) -> bool {
        self.phase == FetchPhase::Failed
    }
}

/// Transitions dispatched by the async fetch wrapper.
///
/// `page_index`/`append`/`clear` on the completion variants are the paging
/// context captured when the fetch was issued; the object reducer ignores
/// them. `clear` asks the list reducer to drop pages accumulated by a
/// previous load cycle before recording this one.
#[derive(Debug, Clone)]
pub enum FetchTrigger<T> {
    /// Enter `Fetching` for a first load.
    Start,
    /// Enter `Fetching` for a background refresh, keeping existing data
    /// visible.
    Loading,
    Done {
        page_index: u32,
        append: bool,
        clear: bool,
        data: T,
    },
    Fail {
        page_index: u32,
        append: bool,
        clear: bool,
        error: SharedError,
    },
    /// Overwrite `data` without touching fetch bookkeeping (optimistic or
    /// local edits).
    Update(T),
    /// Return to the initial empty state.
    Clear,
}

impl<T> Action for FetchTrigger<T> {
    fn kind(&self) -> &'static str {
        match self {
            FetchTrigger::Start => "FetchStart",
            FetchTrigger::Loading => "FetchLoading",
            FetchTrigger::Done { .. } => "FetchDone",
            FetchTrigger::Fail { .. } => "FetchFail",
            FetchTrigger::Update(_) => "FetchUpdate",
            FetchTrigger::Clear => "FetchClear",
        }
    }
}

/// Reducer for single-object fetch targets.
pub struct ObjectFetcherReducer<T> {
    empty: T,
}

impl<T: Clone> ObjectFetcherReducer<T> {
    /// `empty` is the placeholder value shown before the first load and
    /// after `Clear`.
    pub fn new(empty: T) -> Self {
        Self { empty }
    }
}

impl<T> Reducer<FetcherState<T>> for ObjectFetcherReducer<T>
where
    T: Clone + Send + Sync,
{
    type Action = FetchTrigger<T>;

    fn initial(&self) -> FetcherState<T> {
        FetcherState::empty(self.empty.clone())
    }

    fn reduce(&self, mut state: FetcherState<T>, action: &FetchTrigger<T>) -> FetcherState<T> {
        match action {
            FetchTrigger::Start => {
                state.phase = FetchPhase::Fetching;
                state.loading = false;
                state.error = None;
            }
            FetchTrigger::Loading => {
                state.phase = FetchPhase::Fetching;
                state.loading = true;
                state.error = None;
            }
            FetchTrigger::Done { data, .. } => {
                state.phase = FetchPhase::Ready;
                state.data = data.clone();
                state.fetched = true;
                state.loading = false;
                state.error = None;
            }
            FetchTrigger::Fail { error, .. } => {
                // Last good data stays visible alongside the error.
                state.phase = FetchPhase::Failed;
                state.fetched = true;
                state.loading = false;
                state.error = Some(error.clone());
            }
            FetchTrigger::Update(data) => {
                state.data = data.clone();
            }
            FetchTrigger::Clear => {
                state = self.initial();
            }
        }
        state
    }
}

/// Reducer for paged list fetch targets.
///
/// Completions write into `pages[page_index - 1]`; under `append` the
/// visible `data.records` is rebuilt as the in-order concatenation of every
/// non-empty page, so a failed later page never discards earlier successful
/// ones. A replace-mode completion (or one carrying `clear`) starts a new
/// page cache, so an append cycle can never pick up pages left over from a
/// previous filter or search.
pub struct ListFetcherReducer<T> {
    empty: RecordSet<T>,
}

impl<T: Clone> ListFetcherReducer<T> {
    pub fn new() -> Self {
        Self {
            empty: RecordSet::default(),
        }
    }

    /// Use a custom empty value (e.g. a non-zero placeholder count).
    pub fn with_empty(empty: RecordSet<T>) -> Self {
        Self { empty }
    }

    fn ensure_page(&self, pages: &mut Vec<PageState<RecordSet<T>>>, index: usize) {
        while pages.len() <= index {
            pages.push(PageState::untouched(self.empty.clone()));
        }
    }

    fn merged(
        pages: &[PageState<RecordSet<T>>],
        record_count: usize,
        continue_token: Option<String>,
    ) -> RecordSet<T> {
        let records: Vec<T> = pages
            .iter()
            .filter(|page| !page.data.is_empty())
            .flat_map(|page| page.data.records.iter().cloned())
            .collect();
        RecordSet {
            record_count,
            records,
            continue_token,
        }
    }
}

impl<T: Clone> Default for ListFetcherReducer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Reducer<FetcherState<RecordSet<T>>> for ListFetcherReducer<T>
where
    T: Clone + Send + Sync,
{
    type Action = FetchTrigger<RecordSet<T>>;

    fn initial(&self) -> FetcherState<RecordSet<T>> {
        FetcherState::empty(self.empty.clone())
    }

    fn reduce(
        &self,
        mut state: FetcherState<RecordSet<T>>,
        action: &FetchTrigger<RecordSet<T>>,
    ) -> FetcherState<RecordSet<T>> {
        match action {
            FetchTrigger::Start => {
                state.phase = FetchPhase::Fetching;
                state.loading = false;
                state.error = None;
            }
            FetchTrigger::Loading => {
                state.phase = FetchPhase::Fetching;
                state.loading = true;
                state.error = None;
            }
            FetchTrigger::Done {
                page_index,
                append,
                clear,
                data,
            } => {
                state.phase = FetchPhase::Ready;
                state.fetched = true;
                state.loading = false;
                state.error = None;

                if *clear || !*append {
                    state.pages.clear();
                }
                let index = page_index.saturating_sub(1) as usize;
                self.ensure_page(&mut state.pages, index);
                state.pages[index] = PageState {
                    phase: FetchPhase::Ready,
                    fetched: true,
                    loading: false,
                    data: data.clone(),
                    error: None,
                };

                state.data = if *append {
                    Self::merged(
                        &state.pages,
                        data.record_count,
                        data.continue_token.clone(),
                    )
                } else {
                    data.clone()
                };
            }
            FetchTrigger::Fail {
                page_index,
                append,
                clear,
                error,
            } => {
                state.phase = FetchPhase::Failed;
                state.fetched = true;
                state.loading = false;
                state.error = Some(error.clone());

                if *clear || !*append {
                    state.pages.clear();
                }
                let index = page_index.saturating_sub(1) as usize;
                self.ensure_page(&mut state.pages, index);
                state.pages[index] = PageState {
                    phase: FetchPhase::Failed,
                    fetched: true,
                    loading: false,
                    data: self.empty.clone(),
                    error: Some(error.clone()),
                };

                state.data = if *append && !*clear {
                    // Keep everything the earlier pages already delivered;
                    // the failed page contributes nothing.
                    Self::merged(
                        &state.pages,
                        state.data.record_count,
                        state.data.continue_token.clone(),
                    )
                } else {
                    self.empty.clone()
                };
            }
            FetchTrigger::Update(data) => {
                state.data = data.clone();
            }
            FetchTrigger::Clear => {
                state = self.initial();
            }
        }
        state
    }
}
