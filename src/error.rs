use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced by the store runtime itself.
///
/// Errors returned by injected fetchers and executors are never surfaced
/// through this enum; they are recorded verbatim in state as [`SharedError`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("workflow is already performing")]
    AlreadyPerforming,

    #[error("workflow must be reset before it can be started again")]
    NotReset,

    #[error("workflow has no recorded targets; call start() first")]
    NoTargets,
}

/// Cloneable wrapper around an error caught at an injected-contract boundary.
///
/// Fetchers and operation executors report failures as `anyhow::Error`; the
/// store keeps them in state (and in per-target operation results), which
/// requires `Clone`. The original error is shared, not copied.
#[derive(Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    /// Borrow the underlying error chain.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for SharedError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_error_preserves_message() {
        let err = SharedError::new(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "connection refused");

        let clone = err.clone();
        assert_eq!(clone.to_string(), "connection refused");
    }

    #[test]
    fn shared_error_exposes_source() {
        use std::error::Error as _;
        let err = SharedError::new(anyhow::anyhow!("boom"));
        assert!(err.source().is_some());
    }
}
