//! Terminal consumers of a pipeline run.
//!
//! [`drain`] reads the final result stream and the merged error stream
//! concurrently. It finishes only once both have closed, since they close
//! independently and in no particular order, or as soon as cancellation is
//! observed.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cancel::{CancelCause, Shutdown};
use crate::failure::{FailureTracker, FailureVerdict};
use crate::record::ErrorRecord;
use crate::stream::StreamRx;

/// Receiver of a run's results, failures and cancellation notice.
#[async_trait]
pub trait Sink<R: Send + 'static>: Send {
    /// Handle one successful result.
    async fn on_result(&mut self, result: R);

    /// Handle one failed item. Never halts the run by itself.
    async fn on_error(&mut self, record: ErrorRecord);

    /// Called at most once, when cancellation preempts draining.
    async fn on_cancelled(&mut self, _cause: CancelCause) {}
}

#[async_trait]
impl<'a, R, S> Sink<R> for &'a mut S
where
    R: Send + 'static,
    S: Sink<R> + ?Sized,
{
    async fn on_result(&mut self, result: R) {
        (**self).on_result(result).await
    }

    async fn on_error(&mut self, record: ErrorRecord) {
        (**self).on_error(record).await
    }

    async fn on_cancelled(&mut self, cause: CancelCause) {
        (**self).on_cancelled(cause).await
    }
}

/// Counts of what a drain delivered to its sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub results: u64,
    pub errors: u64,
}

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Both streams closed without cancellation.
    Completed(DrainStats),
    /// Cancellation was observed before both streams closed.
    Cancelled { cause: CancelCause, stats: DrainStats },
}

impl DrainOutcome {
    pub fn stats(&self) -> DrainStats {
        match self {
            Self::Completed(stats) | Self::Cancelled { stats, .. } => *stats,
        }
    }
}

/// Drain `results` and `errors` into `sink` until both close or the run is cancelled.
///
/// Every error record goes through `tracker`; when it returns
/// [`FailureVerdict::Halt`] the run is cancelled with
/// [`CancelCause::MaxFailures`].
pub async fn drain<R, S>(
    results: StreamRx<R>,
    errors: StreamRx<ErrorRecord>,
    sink: &mut S,
    tracker: &mut FailureTracker,
    shutdown: &Shutdown,
) -> DrainOutcome
where
    R: Send + 'static,
    S: Sink<R> + ?Sized,
{
    let mut stats = DrainStats::default();
    let mut results_open = true;
    let mut errors_open = true;
    let mut cancelled = false;

    while results_open || errors_open {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                cancelled = true;
                break;
            }

            record = errors.recv_any(), if errors_open => match record {
                Some(record) => {
                    stats.errors += 1;
                    let verdict = tracker.record(&record);
                    sink.on_error(record).await;
                    if let FailureVerdict::Halt { count } = verdict {
                        shutdown.cancel(CancelCause::MaxFailures { count });
                    }
                }
                None => {
                    debug!("Error stream closed");
                    errors_open = false;
                }
            },

            result = results.recv_any(), if results_open => match result {
                Some(result) => {
                    stats.results += 1;
                    sink.on_result(result).await;
                }
                None => {
                    debug!("Result stream closed");
                    results_open = false;
                }
            },
        }
    }

    if cancelled {
        let cause = shutdown.cause().unwrap_or(CancelCause::Requested);
        debug!(cause = %cause, results = stats.results, errors = stats.errors, "Drain cancelled");
        sink.on_cancelled(cause).await;
        return DrainOutcome::Cancelled { cause, stats };
    }

    DrainOutcome::Completed(stats)
}

/// Sink that keeps everything it receives.
#[derive(Debug)]
pub struct CollectingSink<R> {
    pub results: Vec<R>,
    pub errors: Vec<ErrorRecord>,
    pub cancelled: Option<CancelCause>,
}

impl<R> Default for CollectingSink<R> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
            cancelled: None,
        }
    }
}

impl<R> CollectingSink<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results plus errors received.
    pub fn total(&self) -> usize {
        self.results.len() + self.errors.len()
    }
}

#[async_trait]
impl<R: Send + 'static> Sink<R> for CollectingSink<R> {
    async fn on_result(&mut self, result: R) {
        self.results.push(result);
    }

    async fn on_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    async fn on_cancelled(&mut self, cause: CancelCause) {
        self.cancelled = Some(cause);
    }
}

/// Sink that reports through `tracing` and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl<R> Sink<R> for LoggingSink
where
    R: std::fmt::Display + Send + 'static,
{
    async fn on_result(&mut self, result: R) {
        info!("sink: {result}");
    }

    async fn on_error(&mut self, record: ErrorRecord) {
        warn!(item = %record.item, stage = ?record.stage, "sink error: {}", record.message);
    }

    async fn on_cancelled(&mut self, cause: CancelCause) {
        warn!(cause = %cause, "sink: run cancelled before draining finished");
    }
}
