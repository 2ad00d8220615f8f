//! # console-store
//!
//! Asynchronous list/object state management and operation workflows for
//! resource consoles: the store runtime that feature modules (cluster,
//! workload, service screens and the like) are built on.
//!
//! A feature module composes one query/fetcher pair per resource collection
//! plus zero or more workflows per mutating operation into a single typed
//! [`store::Store`]; the generated action bundles, the polling engine, and
//! the workflow machine all re-enter the same synchronous dispatch path, so
//! there is exactly one way state changes regardless of trigger origin.
//! Transport stays outside: lists and objects arrive through injected
//! [`contracts::ListFetcher`]/[`contracts::ObjectFetcher`] implementations
//! and mutations run through an injected [`contracts::OperationExecutor`].
//!
//! ## Modules
//!
//! - `action` - Action naming, resource tagging, and the teardown sentinel
//! - `contracts` - Injected fetcher/executor/hook contracts
//! - `error` - Typed runtime errors and the cloneable boundary error
//! - `fetcher` - Fetch lifecycle state with per-page cache and merging
//! - `list` - Dispatchable operation bundle for a resource collection
//! - `object` - Dispatchable operation bundle for a single-object target
//! - `polling` - Cancellable poll loops with failure budget and visibility gating
//! - `query` - Paging/keyword/filter/sort view description and its reducer
//! - `selection` - Order-preserving record selection
//! - `store` - Reducer contract, resettable root, and the dispatch path
//! - `workflow` - Resettable state machine for mutating operations

pub mod action;
pub mod contracts;
pub mod error;
pub mod fetcher;
pub mod list;
pub mod object;
pub mod polling;
pub mod query;
pub mod selection;
pub mod store;
pub mod workflow;
