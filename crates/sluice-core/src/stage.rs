//! Pipeline stages with internal fan-out.
//!
//! A stage applies a user function to every item of its input stream. It runs
//! `width` workers that all pull from the same input, so each item is handled
//! by exactly one worker. Every worker owns one result stream and one error
//! stream and closes both when its input is exhausted or the run is cancelled.
//!
//! Ordering is preserved only when `width == 1`.

use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use snafu::ensure;
use tracing::debug;

use crate::cancel::Shutdown;
use crate::emit;
use crate::error::{ConstructionError, EmptyStageNameSnafu, ZeroWidthSnafu};
use crate::metrics::events::{
    ItemDuration, ItemProcessed, ItemStatus, WorkerStarted, WorkerStopped,
};
use crate::record::ErrorRecord;
use crate::scope::RunScope;
use crate::stream::{Handoff, StreamRx, StreamTx, channel};

/// Boxed future returned by a stage function.
pub type StageFuture<R> = Pin<Box<dyn Future<Output = Result<R, ErrorRecord>> + Send>>;

type StageFn<T, R> = Arc<dyn Fn(T) -> StageFuture<R> + Send + Sync>;

/// Number of workers matching the available parallelism (at least 1).
pub fn available_width() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// A named stage: a user function plus its fan-out width.
pub struct StageSpec<T, R> {
    name: String,
    width: usize,
    func: StageFn<T, R>,
}

impl<T, R> Clone for StageSpec<T, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            width: self.width,
            func: self.func.clone(),
        }
    }
}

impl<T, R> fmt::Debug for StageSpec<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSpec")
            .field("name", &self.name)
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

/// The per-worker streams produced by [`StageSpec::run`].
pub struct StageOutputs<R> {
    /// One result stream per worker.
    pub results: Vec<StreamRx<R>>,
    /// One error stream per worker.
    pub errors: Vec<StreamRx<ErrorRecord>>,
}

impl<T, R> StageSpec<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Stage from an async function.
    pub fn new<F, Fut>(name: impl Into<String>, width: usize, func: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ErrorRecord>> + Send + 'static,
    {
        Self {
            name: name.into(),
            width,
            func: Arc::new(move |item| -> StageFuture<R> { Box::pin(func(item)) }),
        }
    }

    /// Stage from a cheap synchronous function, run inline on the worker.
    pub fn from_fn<F>(name: impl Into<String>, width: usize, func: F) -> Self
    where
        F: Fn(T) -> Result<R, ErrorRecord> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            width,
            func: Arc::new(move |item| -> StageFuture<R> {
                Box::pin(std::future::ready(func(item)))
            }),
        }
    }

    /// Stage from a blocking function, run on the blocking thread pool.
    ///
    /// A call in progress cannot be interrupted by cancellation; the worker
    /// waits for it and then observes the signal at its next handoff.
    pub fn blocking<F>(name: impl Into<String>, width: usize, func: F) -> Self
    where
        F: Fn(T) -> Result<R, ErrorRecord> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self {
            name: name.into(),
            width,
            func: Arc::new(move |item| -> StageFuture<R> {
                let func = func.clone();
                Box::pin(async move {
                    match tokio::task::spawn_blocking(move || (*func)(item)).await {
                        Ok(outcome) => outcome,
                        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                        Err(e) => Err(ErrorRecord::new("<unknown>", e.to_string())),
                    }
                })
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Replace the fan-out width.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Check the stage can be run.
    pub fn validate(&self) -> Result<(), ConstructionError> {
        ensure!(!self.name.is_empty(), EmptyStageNameSnafu);
        ensure!(
            self.width > 0,
            ZeroWidthSnafu {
                stage: self.name.clone()
            }
        );
        Ok(())
    }

    /// Launch `width` workers on `input` inside `scope`.
    ///
    /// Returns exactly `width` result streams and `width` error streams.
    pub fn run(&self, input: StreamRx<T>, scope: &mut RunScope) -> StageOutputs<R> {
        let mut outputs = StageOutputs {
            results: Vec::with_capacity(self.width),
            errors: Vec::with_capacity(self.width),
        };

        for worker in 0..self.width {
            let (result_tx, result_rx) = channel(scope.capacity());
            let (error_tx, error_rx) = channel(scope.capacity());

            let ctx = WorkerContext {
                stage: self.name.clone(),
                worker,
                shutdown: scope.shutdown().clone(),
            };
            scope.spawn(
                format!("{}/worker-{worker}", self.name),
                run_worker(ctx, input.share(), self.func.clone(), result_tx, error_tx),
            );

            outputs.results.push(result_rx);
            outputs.errors.push(error_rx);
        }

        debug!(stage = %self.name, width = self.width, "Stage workers launched");
        outputs
    }
}

/// Parameters owned by one worker task.
struct WorkerContext {
    stage: String,
    worker: usize,
    shutdown: Shutdown,
}

async fn run_worker<T, R>(
    ctx: WorkerContext,
    input: StreamRx<T>,
    func: StageFn<T, R>,
    results: StreamTx<R>,
    errors: StreamTx<ErrorRecord>,
) {
    emit!(WorkerStarted {
        stage: ctx.stage.clone(),
    });
    let mut processed: u64 = 0;

    while let Some(item) = input.recv(&ctx.shutdown).await {
        if ctx.shutdown.is_cancelled() {
            break;
        }

        let start = Instant::now();
        let outcome = func(item).await;
        emit!(ItemDuration {
            duration: start.elapsed(),
            stage: ctx.stage.clone(),
        });

        let handoff = match outcome {
            Ok(result) => {
                emit!(ItemProcessed {
                    status: ItemStatus::Success,
                    stage: ctx.stage.clone(),
                });
                results.send(result, &ctx.shutdown).await
            }
            Err(record) => {
                emit!(ItemProcessed {
                    status: ItemStatus::Failed,
                    stage: ctx.stage.clone(),
                });
                let record = record.with_origin(&ctx.stage, ctx.worker);
                debug!(stage = %ctx.stage, worker = ctx.worker, error = %record, "Item failed");
                errors.send(record, &ctx.shutdown).await
            }
        };

        match handoff {
            Handoff::Delivered => processed += 1,
            Handoff::Cancelled => {
                debug!(stage = %ctx.stage, worker = ctx.worker, "Cancelled during handoff");
                break;
            }
            Handoff::Disconnected => {
                debug!(stage = %ctx.stage, worker = ctx.worker, "Downstream closed");
                break;
            }
        }
    }

    debug!(stage = %ctx.stage, worker = ctx.worker, processed, "Worker finished");
    emit!(WorkerStopped {
        stage: ctx.stage,
        processed,
    });
    results.close();
    errors.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelCause;
    use crate::source::{IterSource, Source};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    fn double(n: u32) -> Result<u32, ErrorRecord> {
        Ok(n * 2)
    }

    fn reject_odd(n: u32) -> Result<u32, ErrorRecord> {
        if n % 2 == 0 {
            Ok(n)
        } else {
            Err(ErrorRecord::new(n.to_string(), "odd"))
        }
    }

    async fn drain_outputs<R>(outputs: StageOutputs<R>) -> (Vec<R>, Vec<ErrorRecord>) {
        let mut results = Vec::new();
        let mut errors = Vec::new();
        // Buffered streams keep workers from blocking on unread siblings.
        for rx in outputs.results {
            results.extend(rx.collect().await);
        }
        for rx in outputs.errors {
            errors.extend(rx.collect().await);
        }
        (results, errors)
    }

    #[test]
    fn test_validate_rejects_zero_width() {
        let spec = StageSpec::from_fn("double", 0, double);
        assert_eq!(
            spec.validate(),
            Err(ConstructionError::ZeroWidth {
                stage: "double".to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let spec = StageSpec::from_fn("", 1, double);
        assert_eq!(spec.validate(), Err(ConstructionError::EmptyStageName));
    }

    #[test]
    fn test_available_width_is_positive() {
        assert!(available_width() >= 1);
    }

    #[tokio::test]
    async fn test_run_returns_width_streams() {
        let mut scope = RunScope::new(Shutdown::new(), 64);
        let input = IterSource::new(0..10u32).produce(&mut scope);

        let outputs = StageSpec::from_fn("double", 3, double).run(input, &mut scope);
        assert_eq!(outputs.results.len(), 3);
        assert_eq!(outputs.errors.len(), 3);

        let (mut results, errors) = drain_outputs(outputs).await;
        results.sort_unstable();
        assert_eq!(results, (0..10).map(|n| n * 2).collect::<Vec<_>>());
        assert!(errors.is_empty());
        assert!(scope.join_all().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fan_out_processes_each_item_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_workers = seen.clone();

        let mut scope = RunScope::new(Shutdown::new(), 256);
        let input = IterSource::new(0..200u32).produce(&mut scope);
        let spec = StageSpec::new("record", 4, move |n: u32| {
            let seen = seen_by_workers.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                seen.lock().unwrap().push(n);
                reject_odd(n)
            }
        });

        let (results, errors) = drain_outputs(spec.run(input, &mut scope)).await;
        assert!(scope.join_all().await.is_empty());

        assert_eq!(results.len() + errors.len(), 200);
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..200).collect::<Vec<_>>(), "no item lost or duplicated");
    }

    #[tokio::test]
    async fn test_errors_are_tagged_with_origin() {
        let mut scope = RunScope::new(Shutdown::new(), 16);
        let input = IterSource::new(vec![1u32, 2, 3]).produce(&mut scope);

        let (results, errors) =
            drain_outputs(StageSpec::from_fn("even", 1, reject_odd).run(input, &mut scope)).await;

        assert_eq!(results, vec![2]);
        let items: HashSet<_> = errors.iter().map(|e| e.item.as_str()).collect();
        assert_eq!(items, HashSet::from(["1", "3"]));
        for record in &errors {
            assert_eq!(record.stage.as_deref(), Some("even"));
            assert_eq!(record.worker, Some(0));
        }
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let mut scope = RunScope::new(Shutdown::new(), 0);
        let input = IterSource::new(0..50u32).produce(&mut scope);

        let mut outputs = StageSpec::from_fn("double", 1, double).run(input, &mut scope);
        let results = outputs.results.remove(0).collect().await;
        assert_eq!(results, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_stage_runs_off_runtime() {
        let mut scope = RunScope::new(Shutdown::new(), 16);
        let input = IterSource::new(vec![1u32, 2, 3, 4]).produce(&mut scope);
        let spec = StageSpec::blocking("sleepy", 2, |n: u32| {
            std::thread::sleep(Duration::from_millis(10));
            double(n)
        });

        let (mut results, _) = drain_outputs(spec.run(input, &mut scope)).await;
        results.sort_unstable();
        assert_eq!(results, vec![2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn test_workers_close_streams_on_cancel() {
        let shutdown = Shutdown::new();
        let mut scope = RunScope::new(shutdown.clone(), 0);
        let input = IterSource::new(0..u32::MAX).produce(&mut scope);

        let outputs = StageSpec::from_fn("double", 2, double).run(input, &mut scope);
        shutdown.cancel(CancelCause::Requested);

        let drained = tokio::time::timeout(Duration::from_secs(1), drain_outputs(outputs)).await;
        assert!(drained.is_ok(), "every worker stream must close after cancel");
        assert!(scope.join_all().await.is_empty());
    }
}
