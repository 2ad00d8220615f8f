//! Injected contracts at the store boundary.
//!
//! The runtime never talks to a backend itself: list and object data arrive
//! through a caller-supplied fetcher, mutations run through a caller-supplied
//! executor, and both are opaque here. The core only distinguishes
//! "resolved" from "errored" and records errors verbatim; classifying
//! transport failures is the injected function's business.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::error::SharedError;
use crate::fetcher::RecordSet;
use crate::query::QueryState;
use crate::store::Store;
use crate::workflow::OperationResult;

/// Transport for a paged list target.
#[async_trait]
pub trait ListFetcher<F, T>: Send + Sync {
    async fn fetch(&self, query: &QueryState<F>) -> anyhow::Result<RecordSet<T>>;
}

/// Transport for a single-object target.
#[async_trait]
pub trait ObjectFetcher<F, T>: Send + Sync {
    async fn fetch(&self, query: &QueryState<F>) -> anyhow::Result<T>;
}

/// Long-running mutating operation over one or more targets.
///
/// Per-target failures belong inside the returned results
/// (`success: false` plus an error), not in the outer `Err`: "the operation
/// finished" and "every target succeeded" are distinct. An outer `Err` is
/// treated by the workflow machine as every target having failed.
#[async_trait]
pub trait OperationExecutor<Tgt, P>: Send + Sync {
    async fn execute(&self, targets: &[Tgt], params: &P)
        -> anyhow::Result<Vec<OperationResult<Tgt>>>;
}

/// Runs after every applied fetch completion, success or failure.
///
/// This is the extension point feature modules use to chain dependent
/// fetches (e.g. after clusters load, select a default and fetch its
/// addons); the store handle gives the hook dispatch and state access.
/// A completion superseded by a newer fetch on the same bundle is dropped
/// without running the hook, so chained fetches never act on stale data.
#[async_trait]
pub trait FetchHook<S, A, D>: Send + Sync {
    async fn on_finish(&self, outcome: Result<D, SharedError>, store: Arc<Store<S, A>>);
}

/// Adapter turning an async closure into a [`ListFetcher`].
pub struct ListFetchFn<Func>(Func);

impl<Func> ListFetchFn<Func> {
    pub fn new(f: Func) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, T, Func> ListFetcher<F, T> for ListFetchFn<Func>
where
    F: Send + Sync,
    Func: Fn(&QueryState<F>) -> BoxFuture<'static, anyhow::Result<RecordSet<T>>> + Send + Sync,
{
    async fn fetch(&self, query: &QueryState<F>) -> anyhow::Result<RecordSet<T>> {
        (self.0)(query).await
    }
}

/// Adapter turning an async closure into an [`ObjectFetcher`].
pub struct ObjectFetchFn<Func>(Func);

impl<Func> ObjectFetchFn<Func> {
    pub fn new(f: Func) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, T, Func> ObjectFetcher<F, T> for ObjectFetchFn<Func>
where
    F: Send + Sync,
    Func: Fn(&QueryState<F>) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync,
{
    async fn fetch(&self, query: &QueryState<F>) -> anyhow::Result<T> {
        (self.0)(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryState;
    use futures::FutureExt;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn closure_adapters_forward_the_query() {
        let list = ListFetchFn::new(|query: &QueryState<Value>| {
            let page_index = query.paging.page_index;
            async move { Ok(RecordSet::new(1, vec![format!("page-{page_index}")])) }.boxed()
        });
        let fetched = list.fetch(&QueryState::new(20, json!({}))).await.unwrap();
        assert_eq!(fetched.records, vec!["page-1"]);

        let object = ObjectFetchFn::new(|query: &QueryState<Value>| {
            let name = query.filter.get("name").cloned();
            async move { name.ok_or_else(|| anyhow::anyhow!("no object selected")) }.boxed()
        });
        let err = object.fetch(&QueryState::new(1, json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("no object selected"));
    }
}
