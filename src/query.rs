//! Query state: the paging/keyword/filter/sort description of what a
//! collection view currently wants to see, and its pure reducer.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::store::Reducer;

/// Patch-merge for structured filter values.
///
/// Filter actions carry partial filters that are merged into the current
/// one, so feature modules can update a single facet without restating the
/// rest.
pub trait Merge {
    fn merge(&mut self, patch: Self);
}

impl<V> Merge for HashMap<String, V> {
    fn merge(&mut self, patch: Self) {
        self.extend(patch);
    }
}

impl<V> Merge for BTreeMap<String, V> {
    fn merge(&mut self, patch: Self) {
        self.extend(patch);
    }
}

/// Object patches merge key-by-key; anything else replaces wholesale.
impl Merge for serde_json::Value {
    fn merge(&mut self, patch: Self) {
        use serde_json::Value;
        match (self, patch) {
            (Value::Object(base), Value::Object(patch)) => {
                for (key, value) in patch {
                    base.insert(key, value);
                }
            }
            (slot, patch) => *slot = patch,
        }
    }
}

/// Paging cursor for a collection view.
///
/// `append` requests infinite-scroll semantics: each fetched page is merged
/// after the previous ones instead of replacing them. `clear` asks the next
/// load to drop accumulated pages first; paging resets set it whenever they
/// leave append mode, and `NextPage` clears it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub page_index: u32,
    pub page_size: u32,
    pub append: bool,
    pub clear: bool,
}

impl Paging {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_index: 1,
            page_size,
            append: false,
            clear: false,
        }
    }

    /// Back to page one, keeping the current page size. Leaving append mode
    /// asks the next load to drop the accumulated page cache.
    fn first_page(&self) -> Self {
        Self {
            page_index: 1,
            page_size: self.page_size,
            append: false,
            clear: self.append,
        }
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::new(20)
    }
}

/// Sort column and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SortSpec {
    pub by: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn ascending(by: impl Into<String>) -> Self {
        Self {
            by: by.into(),
            descending: false,
        }
    }

    pub fn descending(by: impl Into<String>) -> Self {
        Self {
            by: by.into(),
            descending: true,
        }
    }
}

/// The current view description of one collection: paging cursor, live
/// keyword, committed search text, structured filter, sort spec, a parallel
/// structured-filter channel (e.g. tag search), and the server continuation
/// token for incremental list loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryState<F> {
    pub paging: Paging,
    pub keyword: String,
    pub search: String,
    pub filter: F,
    pub search_filter: F,
    pub sort: SortSpec,
    pub continue_token: Option<String>,
}

impl<F: Default> QueryState<F> {
    pub fn new(page_size: u32, filter: F) -> Self {
        Self {
            paging: Paging::new(page_size),
            filter,
            ..Self::default()
        }
    }
}

/// Transitions over [`QueryState`].
///
/// The `Change*` variants update the view description without implying a
/// refetch; the `Apply*`/`Perform*` variants are dispatched by bundle
/// operations that refetch immediately after. `ApplyPolling` exists so the
/// polling engine can refresh the filter without resetting in-flight
/// pagination.
#[derive(Debug, Clone)]
pub enum QueryAction<F> {
    ChangeKeyword(String),
    PerformSearch(String),
    ChangeFilter(F),
    ApplyFilter(F),
    ApplyPolling(F),
    ChangeSearchFilter(F),
    ApplySearchFilter(F),
    ChangeContinueToken(Option<String>),
    ChangePaging(Paging),
    ChangePagingIndex(u32),
    ResetPaging,
    NextPage,
    SortBy(SortSpec),
    Reset,
}

impl<F> Action for QueryAction<F> {
    fn kind(&self) -> &'static str {
        match self {
            QueryAction::ChangeKeyword(_) => "ChangeKeyword",
            QueryAction::PerformSearch(_) => "PerformSearch",
            QueryAction::ChangeFilter(_) => "ChangeFilter",
            QueryAction::ApplyFilter(_) => "ApplyFilter",
            QueryAction::ApplyPolling(_) => "ApplyPolling",
            QueryAction::ChangeSearchFilter(_) => "ChangeSearchFilter",
            QueryAction::ApplySearchFilter(_) => "ApplySearchFilter",
            QueryAction::ChangeContinueToken(_) => "ChangeContinueToken",
            QueryAction::ChangePaging(_) => "ChangePaging",
            QueryAction::ChangePagingIndex(_) => "ChangePagingIndex",
            QueryAction::ResetPaging => "ResetPaging",
            QueryAction::NextPage => "NextPage",
            QueryAction::SortBy(_) => "SortBy",
            QueryAction::Reset => "Reset",
        }
    }
}

/// Pure reducer over [`QueryState`], bound to its declared initial state.
///
/// Invariant: `paging.page_index >= 1` after every transition. A new search
/// or applied filter always returns to page one; `ApplyPolling` never does.
pub struct QueryReducer<F> {
    initial: QueryState<F>,
}

impl<F: Clone> QueryReducer<F> {
    pub fn new(initial: QueryState<F>) -> Self {
        Self { initial }
    }
}

impl<F> Reducer<QueryState<F>> for QueryReducer<F>
where
    F: Merge + Clone + Send + Sync,
{
    type Action = QueryAction<F>;

    fn initial(&self) -> QueryState<F> {
        self.initial.clone()
    }

    fn reduce(&self, mut state: QueryState<F>, action: &QueryAction<F>) -> QueryState<F> {
        match action {
            QueryAction::ChangeKeyword(keyword) => {
                state.keyword = keyword.clone();
            }
            QueryAction::PerformSearch(keyword) => {
                state.keyword = keyword.clone();
                state.search = keyword.clone();
                state.paging = state.paging.first_page();
            }
            QueryAction::ChangeFilter(patch) => {
                state.filter.merge(patch.clone());
            }
            QueryAction::ApplyFilter(patch) => {
                state.filter.merge(patch.clone());
                state.paging = state.paging.first_page();
            }
            QueryAction::ApplyPolling(patch) => {
                // Same merge as ApplyFilter, but in-flight pagination is
                // preserved across poll ticks.
                state.filter.merge(patch.clone());
            }
            QueryAction::ChangeSearchFilter(patch) => {
                state.search_filter.merge(patch.clone());
            }
            QueryAction::ApplySearchFilter(patch) => {
                state.search_filter.merge(patch.clone());
                state.paging = state.paging.first_page();
            }
            QueryAction::ChangeContinueToken(token) => {
                state.continue_token = token.clone();
            }
            QueryAction::ChangePaging(paging) => {
                state.paging = paging.clone();
                state.paging.page_index = state.paging.page_index.max(1);
            }
            QueryAction::ChangePagingIndex(index) => {
                state.paging.page_index = (*index).max(1);
            }
            QueryAction::ResetPaging => {
                state.paging = self.initial.paging.clone();
            }
            QueryAction::NextPage => {
                state.paging.page_index += 1;
                state.paging.append = true;
                state.paging.clear = false;
            }
            QueryAction::SortBy(sort) => {
                state.sort = sort.clone();
            }
            QueryAction::Reset => {
                state = self.initial.clone();
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reducer() -> QueryReducer<serde_json::Value> {
        QueryReducer::new(QueryState::new(20, json!({})))
    }

    #[test]
    fn apply_filter_merges_and_resets_paging() {
        let r = reducer();
        let mut state = r.initial();
        state = r.reduce(state, &QueryAction::ApplyFilter(json!({"status": "running"})));
        assert_eq!(state.paging.page_index, 1);
        assert_eq!(state.filter, json!({"status": "running"}));

        state = r.reduce(
            state,
            &QueryAction::ChangePaging(Paging {
                page_index: 2,
                page_size: 20,
                append: false,
                clear: false,
            }),
        );
        assert_eq!(state.paging.page_index, 2);

        state = r.reduce(state, &QueryAction::ApplyFilter(json!({"status": "stopped"})));
        assert_eq!(state.paging.page_index, 1);
        assert_eq!(state.filter, json!({"status": "stopped"}));
    }

    #[test]
    fn apply_polling_preserves_paging() {
        let r = reducer();
        let mut state = r.initial();
        state = r.reduce(state, &QueryAction::ChangePagingIndex(3));
        state = r.reduce(state, &QueryAction::ApplyPolling(json!({"status": "running"})));
        assert_eq!(state.paging.page_index, 3);
        assert_eq!(state.filter, json!({"status": "running"}));
    }

    #[test]
    fn perform_search_sets_both_channels_and_resets_paging() {
        let r = reducer();
        let mut state = r.initial();
        state = r.reduce(state, &QueryAction::ChangePagingIndex(4));
        state = r.reduce(state, &QueryAction::PerformSearch("nginx".into()));
        assert_eq!(state.keyword, "nginx");
        assert_eq!(state.search, "nginx");
        assert_eq!(state.paging.page_index, 1);
    }

    #[test]
    fn change_keyword_does_not_commit_search() {
        let r = reducer();
        let state = r.reduce(r.initial(), &QueryAction::ChangeKeyword("ngi".into()));
        assert_eq!(state.keyword, "ngi");
        assert_eq!(state.search, "");
    }

    #[test]
    fn next_page_enters_append_mode() {
        let r = reducer();
        let state = r.reduce(r.initial(), &QueryAction::NextPage);
        assert_eq!(state.paging.page_index, 2);
        assert!(state.paging.append);
        assert!(!state.paging.clear);
    }

    #[test]
    fn leaving_append_mode_requests_a_cache_clear() {
        let r = reducer();
        let mut state = r.reduce(r.initial(), &QueryAction::NextPage);
        state = r.reduce(state, &QueryAction::ApplyFilter(json!({"status": "running"})));
        assert_eq!(state.paging.page_index, 1);
        assert!(!state.paging.append);
        assert!(state.paging.clear);

        // Re-entering append mode drops the request again.
        state = r.reduce(state, &QueryAction::NextPage);
        assert!(state.paging.append);
        assert!(!state.paging.clear);

        // A reset from plain paged mode has nothing to clear.
        let state = r.reduce(r.initial(), &QueryAction::PerformSearch("web".into()));
        assert!(!state.paging.clear);
    }

    #[test]
    fn reset_is_idempotent() {
        let r = reducer();
        let mut state = r.initial();
        state = r.reduce(state, &QueryAction::ApplyFilter(json!({"ns": "kube-system"})));
        state = r.reduce(state, &QueryAction::SortBy(SortSpec::descending("age")));

        let once = r.reduce(state, &QueryAction::Reset);
        assert_eq!(once, r.initial());
        let twice = r.reduce(once.clone(), &QueryAction::Reset);
        assert_eq!(once, twice);
    }

    #[test]
    fn page_index_never_drops_below_one() {
        let r = reducer();
        let state = r.reduce(r.initial(), &QueryAction::ChangePagingIndex(0));
        assert_eq!(state.paging.page_index, 1);

        let state = r.reduce(
            state,
            &QueryAction::ChangePaging(Paging {
                page_index: 0,
                page_size: 10,
                append: false,
                clear: false,
            }),
        );
        assert_eq!(state.paging.page_index, 1);
        assert_eq!(state.paging.page_size, 10);
    }

    #[test]
    fn search_filter_channel_is_independent() {
        let r = reducer();
        let mut state = r.initial();
        state = r.reduce(state, &QueryAction::ApplyFilter(json!({"status": "running"})));
        state = r.reduce(
            state,
            &QueryAction::ApplySearchFilter(json!({"tag": "env:prod"})),
        );
        assert_eq!(state.filter, json!({"status": "running"}));
        assert_eq!(state.search_filter, json!({"tag": "env:prod"}));
    }

    #[test]
    fn map_filters_merge_by_key() {
        let mut base: HashMap<String, String> = HashMap::from([
            ("status".into(), "running".into()),
            ("zone".into(), "a".into()),
        ]);
        base.merge(HashMap::from([("status".into(), "stopped".into())]));
        assert_eq!(base.get("status").map(String::as_str), Some("stopped"));
        assert_eq!(base.get("zone").map(String::as_str), Some("a"));
    }
}
