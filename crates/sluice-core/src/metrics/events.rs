//! Internal events for pipeline metrics emission.
//!
//! Each event struct represents a measurable occurrence in a pipeline run and
//! records the corresponding metric through the `metrics` facade. Without an
//! installed recorder the calls are no-ops.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when a source finishes emitting.
pub struct ItemsProduced {
    pub count: u64,
}

impl InternalEvent for ItemsProduced {
    fn emit(self) {
        trace!(count = self.count, "Items produced");
        counter!("sluice_items_produced_total").increment(self.count);
    }
}

/// Outcome of applying a stage function to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Success,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Success => "success",
            ItemStatus::Failed => "failed",
        }
    }
}

/// Event emitted after a stage worker processes an item.
pub struct ItemProcessed {
    pub status: ItemStatus,
    pub stage: String,
}

impl InternalEvent for ItemProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), stage = %self.stage, "Item processed");
        counter!(
            "sluice_items_processed_total",
            "status" => self.status.as_str(),
            "stage" => self.stage
        )
        .increment(1);
    }
}

/// Time spent inside the stage function for one item.
pub struct ItemDuration {
    pub duration: Duration,
    pub stage: String,
}

impl InternalEvent for ItemDuration {
    fn emit(self) {
        histogram!("sluice_item_duration_seconds", "stage" => self.stage)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a stage worker starts.
pub struct WorkerStarted {
    pub stage: String,
}

impl InternalEvent for WorkerStarted {
    fn emit(self) {
        gauge!("sluice_active_workers", "stage" => self.stage).increment(1.0);
    }
}

/// Event emitted when a stage worker stops.
pub struct WorkerStopped {
    pub stage: String,
    pub processed: u64,
}

impl InternalEvent for WorkerStopped {
    fn emit(self) {
        trace!(stage = %self.stage, processed = self.processed, "Worker stopped");
        gauge!("sluice_active_workers", "stage" => self.stage).decrement(1.0);
    }
}

/// Event emitted when a merger finishes forwarding.
pub struct ItemsMerged {
    pub count: u64,
    pub merge: String,
}

impl InternalEvent for ItemsMerged {
    fn emit(self) {
        trace!(count = self.count, merge = %self.merge, "Items merged");
        counter!("sluice_items_merged_total", "merge" => self.merge).increment(self.count);
    }
}

/// Event emitted when the sink receives an error record.
pub struct FailureRecorded {
    pub stage: Option<String>,
    pub pipeline: String,
}

impl InternalEvent for FailureRecorded {
    fn emit(self) {
        let stage = self.stage.unwrap_or_else(|| "unknown".to_string());
        trace!(stage = %stage, pipeline = %self.pipeline, "Failure recorded");
        counter!(
            "sluice_failures_total",
            "stage" => stage,
            "pipeline" => self.pipeline
        )
        .increment(1);
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Panicked,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Panicked => "panicked",
        }
    }
}

/// Event emitted once per pipeline run.
pub struct RunCompleted {
    pub outcome: RunOutcome,
    pub duration: Duration,
    pub pipeline: String,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        trace!(
            outcome = self.outcome.as_str(),
            duration_ms = self.duration.as_millis(),
            pipeline = %self.pipeline,
            "Run completed"
        );
        counter!(
            "sluice_runs_total",
            "outcome" => self.outcome.as_str(),
            "pipeline" => self.pipeline.clone()
        )
        .increment(1);
        histogram!("sluice_run_duration_seconds", "pipeline" => self.pipeline)
            .record(self.duration.as_secs_f64());
    }
}
