//! sluice-core: a staged concurrent pipeline engine.
//!
//! A pipeline is a source, one or more fanned-out stages, and a sink, joined
//! by typed streams and sharing one cancellation signal:
//!
//! - `source` - Finite producers that open a run
//! - `stage` - User functions run by N workers on a shared input
//! - `merge` - Fan-in of many streams into one
//! - `sink` - Terminal consumer of results and the merged error stream
//! - `pipeline` - Builder and run entry point
//! - `cancel` - Run-wide cancellation signal and external handles
//! - `stream` - Cancellable typed channels
//! - `scope` - Ownership and joining of every task in a run
//! - `failure` - max_failures policy applied by the sink
//! - `record` - Per-item failure records
//! - `metrics/` - Internal events and the Prometheus endpoint
//! - `signal` - Signal handling for graceful shutdown
//! - `logging` - Tracing subscriber setup
//! - `error` - Error types

pub mod cancel;
pub mod error;
pub mod failure;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod scope;
pub mod signal;
pub mod sink;
pub mod source;
pub mod stage;
pub mod stream;

// Re-export commonly used items
pub use cancel::{CancelCause, CancelHandle, Shutdown};
pub use error::{ConstructionError, MetricsError, PipelineError};
pub use failure::{FailureTracker, FailureVerdict};
pub use logging::init_tracing;
pub use merge::merge;
pub use metrics::{
    DEFAULT_METRICS_ADDR, MetricsController, init_global as init_metrics,
    init_test as init_metrics_test,
};
pub use pipeline::{Pipeline, PipelineBuilder, RunSummary, build_pipeline};
pub use record::ErrorRecord;
pub use scope::{RunScope, TaskError};
pub use signal::shutdown_signal;
pub use sink::{CollectingSink, DrainOutcome, DrainStats, LoggingSink, Sink, drain};
pub use source::{IterSource, Source};
pub use stage::{StageFuture, StageOutputs, StageSpec, available_width};
pub use stream::{Handoff, RENDEZVOUS, StreamRx, StreamTx, channel};
