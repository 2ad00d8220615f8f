//! Action naming and resource tagging.
//!
//! The original console routed actions through string types built by runtime
//! concatenation (`${resourcePrefix}_${TriggerName}`). Here routing is done
//! by the type system: every resource slice gets its own action enum and the
//! composed root action enum matches on them exhaustively. Strings survive
//! only as tracing labels.

/// Names an action variant for structured tracing.
///
/// Implementations return the variant name only; the resource context comes
/// from the dispatching bundle's [`Resource::NAME`].
pub trait Action {
    fn kind(&self) -> &'static str;
}

/// Compile-time resource tag.
///
/// Replaces the original's string action-type prefixes: two bundles over the
/// same store cannot collide because their slices and action types are
/// distinct, and `NAME` exists purely so log lines read like
/// `resource="cluster" action="ApplyFilter"`.
pub trait Resource: Send + Sync + 'static {
    const NAME: &'static str;
}

/// Envelope dispatched into a store: an application action, or the reserved
/// teardown sentinel that collapses the whole state tree back to its declared
/// initial state.
///
/// Keeping the sentinel on the envelope rather than inside any resource's
/// action enum makes the no-collision invariant structural.
#[derive(Debug, Clone)]
pub enum StoreAction<A> {
    App(A),
    Reset,
}

impl<A: Action> Action for StoreAction<A> {
    fn kind(&self) -> &'static str {
        match self {
            StoreAction::App(action) => action.kind(),
            StoreAction::Reset => "ResetStore",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Action for Noop {
        fn kind(&self) -> &'static str {
            "Noop"
        }
    }

    #[test]
    fn sentinel_has_reserved_kind() {
        assert_eq!(StoreAction::<Noop>::Reset.kind(), "ResetStore");
        assert_eq!(StoreAction::App(Noop).kind(), "Noop");
    }
}
