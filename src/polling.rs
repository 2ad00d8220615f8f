//! Timer-driven polling with a consecutive-failure budget and page-visibility
//! gating.
//!
//! The original console kept poll timers in a global registry keyed by
//! dynamic strings; here every loop is owned by the [`PollHandle`] returned
//! from [`start_polling`], so leaking a poller across a page navigation is a
//! type-level mistake rather than a silent one.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::SharedError;

/// Reports whether the page (or embedding surface) is currently visible.
///
/// Ticks are silently skipped, not queued, while hidden.
pub trait VisibilityProbe: Send + Sync {
    fn is_visible(&self) -> bool;
}

/// Probe for embedders without a visibility signal.
pub struct AlwaysVisible;

impl VisibilityProbe for AlwaysVisible {
    fn is_visible(&self) -> bool {
        true
    }
}

/// One polling tick against a fetch bundle.
///
/// Implementations re-apply the poll filter and refetch; the `Result` feeds
/// the engine's consecutive-failure accounting.
#[async_trait]
pub trait PollTarget: Send + Sync + 'static {
    async fn poll(&self) -> Result<(), SharedError>;
}

/// Polling parameters.
#[derive(Clone)]
pub struct PollingConfig {
    /// Delay between ticks.
    pub interval: Duration,
    /// Consecutive-failure budget; reaching it stops the loop and fires the
    /// error callback.
    pub retry_times: u32,
    pub visibility: Arc<dyn VisibilityProbe>,
}

impl PollingConfig {
    pub fn new(interval: Duration, retry_times: u32) -> Self {
        Self {
            interval,
            retry_times,
            visibility: Arc::new(AlwaysVisible),
        }
    }

    pub fn with_visibility(mut self, probe: Arc<dyn VisibilityProbe>) -> Self {
        self.visibility = probe;
        self
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000), 3)
    }
}

impl fmt::Debug for PollingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingConfig")
            .field("interval", &self.interval)
            .field("retry_times", &self.retry_times)
            .finish_non_exhaustive()
    }
}

/// Owned handle to a running poll loop.
///
/// Dropping the handle cancels the loop; dropping it while the loop is still
/// running logs a warning, since that usually means a page teardown forgot
/// an explicit cancel.
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop the loop. Safe to call after the loop already stopped itself.
    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// True once the loop has stopped, either by cancellation or by
    /// exhausting its failure budget.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                tracing::warn!("poll handle dropped while its loop was still running");
            }
            task.abort();
        }
    }
}

/// Spawn a poll loop over `target`.
///
/// Each iteration runs one tick (unless the probe reports hidden), then
/// sleeps `interval` regardless of whether the tick ran. A successful tick
/// resets the consecutive-failure counter; once failures reach
/// `retry_times`, `on_error` fires exactly once and the loop stops itself.
/// Cancellation through the returned handle is the only other way the loop
/// ends.
pub fn start_polling<P>(
    target: P,
    config: PollingConfig,
    on_error: impl FnOnce() + Send + 'static,
) -> PollHandle
where
    P: PollTarget,
{
    let task = tokio::spawn(async move {
        let mut consecutive_failures = 0u32;
        let mut on_error = Some(on_error);
        loop {
            if config.visibility.is_visible() {
                match target.poll().await {
                    Ok(()) => consecutive_failures = 0,
                    Err(err) => {
                        consecutive_failures += 1;
                        tracing::debug!(
                            error = %err,
                            failures = consecutive_failures,
                            budget = config.retry_times,
                            "poll tick failed"
                        );
                        if consecutive_failures >= config.retry_times {
                            tracing::warn!(
                                failures = consecutive_failures,
                                "poll failure budget exhausted; stopping"
                            );
                            if let Some(callback) = on_error.take() {
                                callback();
                            }
                            break;
                        }
                    }
                }
            }
            time::sleep(config.interval).await;
        }
    });
    PollHandle { task: Some(task) }
}
