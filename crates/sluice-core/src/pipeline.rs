//! Pipeline construction and execution.
//!
//! A run is wired as source, then for each stage a fan-out of workers whose
//! result streams are merged into the next stage's input. The per-worker error
//! streams of every stage are merged into one error stream, and the sink
//! drains the last result stream together with that error stream.

use std::time::{Duration, Instant};

use snafu::prelude::*;
use tracing::{error, info};

use crate::cancel::{CancelCause, CancelHandle, Shutdown};
use crate::emit;
use crate::error::{
    CancelledSnafu, ConstructionError, NoStagesSnafu, PipelineError, TaskPanickedSnafu,
};
use crate::failure::FailureTracker;
use crate::merge::merge;
use crate::metrics::events::{RunCompleted, RunOutcome};
use crate::record::ErrorRecord;
use crate::scope::{RunScope, TaskError};
use crate::sink::{DrainOutcome, Sink, drain};
use crate::source::Source;
use crate::stage::StageSpec;
use crate::stream::{RENDEZVOUS, StreamRx};

const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// Deferred wiring of a run: spawns the components into the scope, collects
/// their error streams, and returns the last result stream.
type Wiring<T> =
    Box<dyn FnOnce(&mut RunScope, &mut Vec<StreamRx<ErrorRecord>>) -> StreamRx<T> + Send>;

/// What a finished run delivered to its sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub results: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Results plus errors delivered.
    pub fn total(&self) -> u64 {
        self.results + self.errors
    }
}

/// Incremental pipeline construction. `T` is the item type of the current tail.
pub struct PipelineBuilder<T> {
    name: String,
    wiring: Wiring<T>,
    stages: Vec<String>,
    problems: Vec<ConstructionError>,
    capacity: usize,
    max_failures: usize,
    deadline: Option<Duration>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Start a pipeline from `source`.
    pub fn new<Src>(source: Src) -> Self
    where
        Src: Source<Item = T>,
    {
        Self {
            name: DEFAULT_PIPELINE_NAME.to_string(),
            wiring: Box::new(move |scope, _errors| source.produce(scope)),
            stages: Vec::new(),
            problems: Vec::new(),
            capacity: RENDEZVOUS,
            max_failures: 0,
            deadline: None,
        }
    }

    /// Append a stage. Validation problems are collected and reported by [`build`](Self::build).
    pub fn stage<R>(self, spec: StageSpec<T, R>) -> PipelineBuilder<R>
    where
        R: Send + 'static,
    {
        let Self {
            name,
            wiring,
            mut stages,
            mut problems,
            capacity,
            max_failures,
            deadline,
        } = self;

        if let Err(e) = spec.validate() {
            problems.push(e);
        }
        if !spec.name().is_empty() && stages.iter().any(|s| s == spec.name()) {
            problems.push(ConstructionError::DuplicateStage {
                stage: spec.name().to_string(),
            });
        }
        stages.push(spec.name().to_string());

        let wiring: Wiring<R> = Box::new(move |scope, errors| {
            let input = wiring(scope, errors);
            let outputs = spec.run(input, scope);
            errors.extend(outputs.errors);
            merge(outputs.results, spec.name(), scope)
        });

        PipelineBuilder {
            name,
            wiring,
            stages,
            problems,
            capacity,
            max_failures,
            deadline,
        }
    }

    /// Name used in logs and metric labels.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Buffer capacity of every stream in the run (0 = rendezvous).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Failures tolerated before the run is cancelled (0 = never).
    pub fn max_failures(mut self, max_failures: usize) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Cancel the run if it has not finished after `deadline`.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach the sink and validate the whole pipeline.
    pub fn build<S>(self, sink: S) -> Result<Pipeline<T, S>, ConstructionError>
    where
        S: Sink<T>,
    {
        let mut problems = self.problems;
        if self.stages.is_empty() {
            problems.push(ConstructionError::NoStages);
        }
        if self.deadline == Some(Duration::ZERO) {
            problems.push(ConstructionError::ZeroDeadline);
        }

        if problems.len() > 1 {
            return Err(ConstructionError::MultipleProblems {
                problems: problems.iter().map(ToString::to_string).collect(),
            });
        }
        if let Some(problem) = problems.pop() {
            return Err(problem);
        }

        Ok(Pipeline {
            name: self.name,
            wiring: self.wiring,
            stages: self.stages,
            sink,
            capacity: self.capacity,
            max_failures: self.max_failures,
            deadline: self.deadline,
            shutdown: Shutdown::new(),
        })
    }
}

/// A validated pipeline, ready to run once.
pub struct Pipeline<R, S> {
    name: String,
    wiring: Wiring<R>,
    stages: Vec<String>,
    sink: S,
    capacity: usize,
    max_failures: usize,
    deadline: Option<Duration>,
    shutdown: Shutdown,
}

impl Pipeline<(), ()> {
    /// Start building a pipeline from `source`.
    pub fn builder<Src: Source>(source: Src) -> PipelineBuilder<Src::Item> {
        PipelineBuilder::new(source)
    }
}

impl<R, S> Pipeline<R, S>
where
    R: Send + 'static,
    S: Sink<R>,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage names in wiring order.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Handle for cancelling the run from another task, e.g. a signal handler.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.shutdown.clone())
    }

    /// Request cancellation. Idempotent; returns `true` if this call was first.
    pub fn cancel(&self) -> bool {
        self.shutdown.cancel(CancelCause::Requested)
    }

    /// Run the pipeline until the sink has drained everything or the run is cancelled.
    ///
    /// Every spawned task has been joined when this returns. A component panic
    /// takes precedence over cancellation in the returned error.
    pub async fn execute(self) -> Result<RunSummary, PipelineError> {
        let Self {
            name,
            wiring,
            stages,
            mut sink,
            capacity,
            max_failures,
            deadline,
            shutdown,
        } = self;

        let started = Instant::now();
        info!(
            pipeline = %name,
            stages = ?stages,
            capacity,
            max_failures,
            deadline_secs = deadline.map(|d| d.as_secs_f64()),
            "Starting pipeline run"
        );

        let mut scope = RunScope::new(shutdown.clone(), capacity);
        let mut error_streams = Vec::new();
        let results = wiring(&mut scope, &mut error_streams);
        let errors = merge(error_streams, "errors", &mut scope);

        let mut tracker = FailureTracker::new(max_failures, name.clone());
        let outcome = drain_with_deadline(
            results,
            errors,
            &mut sink,
            &mut tracker,
            &shutdown,
            deadline,
        )
        .await;

        let failures = scope.join_all().await;
        let stats = outcome.stats();
        let summary = RunSummary {
            results: stats.results,
            errors: stats.errors,
            elapsed: started.elapsed(),
        };

        if let Some(TaskError::Panicked { component, message }) =
            failures.into_iter().find(TaskError::is_panicked)
        {
            error!(pipeline = %name, component = %component, "Pipeline run lost a component");
            emit!(RunCompleted {
                outcome: RunOutcome::Panicked,
                duration: summary.elapsed,
                pipeline: name,
            });
            return TaskPanickedSnafu { component, message }.fail();
        }

        match outcome {
            DrainOutcome::Completed(_) => {
                info!(
                    pipeline = %name,
                    results = summary.results,
                    errors = summary.errors,
                    elapsed_ms = summary.elapsed.as_millis(),
                    "Pipeline run completed"
                );
                emit!(RunCompleted {
                    outcome: RunOutcome::Completed,
                    duration: summary.elapsed,
                    pipeline: name,
                });
                Ok(summary)
            }
            DrainOutcome::Cancelled { cause, .. } => {
                info!(
                    pipeline = %name,
                    cause = %cause,
                    results = summary.results,
                    errors = summary.errors,
                    elapsed_ms = summary.elapsed.as_millis(),
                    "Pipeline run cancelled"
                );
                emit!(RunCompleted {
                    outcome: RunOutcome::Cancelled,
                    duration: summary.elapsed,
                    pipeline: name,
                });
                CancelledSnafu { cause, summary }.fail()
            }
        }
    }
}

/// Drain, cancelling the run with [`CancelCause::Deadline`] if `deadline` elapses first.
async fn drain_with_deadline<R, S>(
    results: StreamRx<R>,
    errors: StreamRx<ErrorRecord>,
    sink: &mut S,
    tracker: &mut FailureTracker,
    shutdown: &Shutdown,
    deadline: Option<Duration>,
) -> DrainOutcome
where
    R: Send + 'static,
    S: Sink<R>,
{
    let draining = drain(results, errors, sink, tracker, shutdown);
    let Some(deadline) = deadline else {
        return draining.await;
    };

    tokio::pin!(draining);
    tokio::select! {
        outcome = &mut draining => outcome,
        _ = tokio::time::sleep(deadline) => {
            shutdown.cancel(CancelCause::Deadline);
            draining.await
        }
    }
}

/// Build a pipeline whose stages all map `T` to `T`.
pub fn build_pipeline<Src, S>(
    source: Src,
    stages: Vec<StageSpec<Src::Item, Src::Item>>,
    sink: S,
) -> Result<Pipeline<Src::Item, S>, ConstructionError>
where
    Src: Source,
    S: Sink<Src::Item>,
{
    ensure!(!stages.is_empty(), NoStagesSnafu);

    stages
        .into_iter()
        .fold(PipelineBuilder::new(source), |builder, spec| builder.stage(spec))
        .build(sink)
}
