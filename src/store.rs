//! Store core: the reducer contract, the resettable root wrapper, and the
//! single synchronous dispatch path.

use tokio::sync::watch;

use crate::action::{Action, StoreAction};

/// A pure reducer bound to its declared initial state.
///
/// Reducers are values rather than bare functions so that factories can bind
/// caller-declared defaults (page size, default filter) and `Reset`-style
/// actions can restore them verbatim. `reduce` must be total: unrecognized
/// or currently-illegal actions return the input state unchanged, which is
/// what lets leaf reducers be embedded in a composed tree without routing
/// glue.
pub trait Reducer<S>: Send + Sync {
    type Action;

    /// The declared initial state.
    fn initial(&self) -> S;

    /// Apply one action. Pure; no I/O, no side effects.
    fn reduce(&self, state: S, action: &Self::Action) -> S;
}

impl<S, R: Reducer<S> + ?Sized> Reducer<S> for Box<R> {
    type Action = R::Action;

    fn initial(&self) -> S {
        (**self).initial()
    }

    fn reduce(&self, state: S, action: &Self::Action) -> S {
        (**self).reduce(state, action)
    }
}

/// Root wrapper that maps the teardown sentinel to the wrapped reducer's
/// initial state and passes everything else through.
///
/// Collapsing to `initial()` re-initializes every leaf of a composed tree at
/// once, so page-scoped state can be discarded on navigation without any
/// leaf knowing about page lifecycle. Note that this does not cancel timers
/// or in-flight fetches; callers pair it with dropping their poll handles.
pub struct Resettable<R> {
    inner: R,
}

impl<R> Resettable<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<S, R: Reducer<S>> Reducer<S> for Resettable<R> {
    type Action = StoreAction<R::Action>;

    fn initial(&self) -> S {
        self.inner.initial()
    }

    fn reduce(&self, state: S, action: &Self::Action) -> S {
        match action {
            StoreAction::Reset => self.inner.initial(),
            StoreAction::App(action) => self.inner.reduce(state, action),
        }
    }
}

/// Holds one composed state tree and applies actions through a single
/// synchronous dispatch path.
///
/// State lives behind a `tokio::sync::watch` channel: dispatches serialize
/// on the channel's internal lock (reducers observe actions in dispatch
/// order), and observers subscribe for change notifications. Asynchronous
/// work (fetch completions, poll ticks, workflow results) re-enters the same
/// path, so there is exactly one way state changes regardless of trigger
/// origin.
pub struct Store<S, A> {
    reducer: Resettable<Box<dyn Reducer<S, Action = A>>>,
    state: watch::Sender<S>,
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    pub fn new<R>(reducer: R) -> Self
    where
        R: Reducer<S, Action = A> + 'static,
    {
        let root = Resettable::new(Box::new(reducer) as Box<dyn Reducer<S, Action = A>>);
        let (state, _) = watch::channel(root.initial());
        Self {
            reducer: root,
            state,
        }
    }

    /// Apply an application action.
    pub fn dispatch(&self, action: A) {
        self.dispatch_store(StoreAction::App(action));
    }

    /// Dispatch the teardown sentinel, collapsing the whole tree back to its
    /// declared initial state.
    pub fn reset(&self) {
        self.dispatch_store(StoreAction::Reset);
    }

    /// Apply a raw store action (application action or sentinel).
    pub fn dispatch_store(&self, action: StoreAction<A>) {
        tracing::trace!(action = action.kind(), "dispatch");
        self.state.send_modify(|state| {
            *state = self.reducer.reduce(state.clone(), &action);
        });
    }

    /// Snapshot the current state.
    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    /// Read the current state without cloning it.
    pub fn with_state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.state.borrow())
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: i64,
    }

    #[derive(Debug)]
    enum CounterAction {
        Add(i64),
    }

    impl Action for CounterAction {
        fn kind(&self) -> &'static str {
            "Add"
        }
    }

    struct CounterReducer {
        start: i64,
    }

    impl Reducer<Counter> for CounterReducer {
        type Action = CounterAction;

        fn initial(&self) -> Counter {
            Counter { value: self.start }
        }

        fn reduce(&self, state: Counter, action: &CounterAction) -> Counter {
            match action {
                CounterAction::Add(n) => Counter {
                    value: state.value + n,
                },
            }
        }
    }

    #[test]
    fn dispatch_applies_in_order() {
        let store = Store::new(CounterReducer { start: 10 });
        store.dispatch(CounterAction::Add(1));
        store.dispatch(CounterAction::Add(2));
        assert_eq!(store.state().value, 13);
    }

    #[test]
    fn reset_restores_declared_initial_state() {
        let store = Store::new(CounterReducer { start: 10 });
        store.dispatch(CounterAction::Add(5));
        store.reset();
        assert_eq!(store.state().value, 10);

        // Resetting an already-initial store is a no-op.
        store.reset();
        assert_eq!(store.state().value, 10);
    }

    #[test]
    fn subscribers_observe_changes() {
        let store = Store::new(CounterReducer { start: 0 });
        let mut rx = store.subscribe();
        store.dispatch(CounterAction::Add(7));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().value, 7);
    }
}
