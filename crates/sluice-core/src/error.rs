//! Error types for the pipeline engine.
//!
//! Item-level failures are not errors here: a failing user function produces
//! an [`ErrorRecord`](crate::record::ErrorRecord) that travels through the
//! pipeline as data. The enums below cover the cases that change control flow.

use snafu::prelude::*;

use crate::cancel::CancelCause;
use crate::pipeline::RunSummary;

// ============ Construction Errors ============

/// Errors detected while building a pipeline, before any task is spawned.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum ConstructionError {
    /// A stage was configured with zero workers.
    #[snafu(display("Stage '{stage}' has zero fan-out width (must be at least 1)"))]
    ZeroWidth { stage: String },

    /// A stage was given an empty name.
    #[snafu(display("Stage names cannot be empty"))]
    EmptyStageName,

    /// Two stages share a name, which would make logs and metrics ambiguous.
    #[snafu(display("Duplicate stage name '{stage}'"))]
    DuplicateStage { stage: String },

    /// `build_pipeline` was called without stages.
    #[snafu(display("Pipeline must have at least one stage"))]
    NoStages,

    /// A deadline of zero would cancel the run before it starts.
    #[snafu(display("Pipeline deadline must be greater than zero"))]
    ZeroDeadline,

    /// Several problems were found at once.
    #[snafu(display("Invalid pipeline:\n{}", problems.join("\n")))]
    MultipleProblems { problems: Vec<String> },
}

// ============ Pipeline Errors ============

/// Errors returned by [`Pipeline::execute`](crate::pipeline::Pipeline::execute).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Cancellation preempted draining. Reported once per run.
    #[snafu(display(
        "Pipeline cancelled ({cause}) after {} results and {} errors",
        summary.results,
        summary.errors
    ))]
    Cancelled {
        cause: CancelCause,
        summary: RunSummary,
    },

    /// A component task panicked; its share of the items was lost.
    #[snafu(display("Component '{component}' panicked: {message}"))]
    TaskPanicked { component: String, message: String },
}

impl PipelineError {
    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }

    /// The cancellation cause, if this is a cancellation.
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            PipelineError::Cancelled { cause, .. } => Some(*cause),
            _ => None,
        }
    }
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to parse the exporter listen address.
    #[snafu(display("Failed to parse metrics address '{address}': {source}"))]
    AddressParse {
        address: String,
        source: std::net::AddrParseError,
    },

    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics already initialized (double-init attempted).
    #[snafu(display("Metrics server already initialized"))]
    AlreadyInitialized,

    /// Metrics controller accessed before init.
    #[snafu(display("Metrics server not initialized"))]
    NotInitialized,
}
