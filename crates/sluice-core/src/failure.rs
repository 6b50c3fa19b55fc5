//! Failure counting with a max_failures limit.
//!
//! The sink records every error record it drains here. With a limit of zero
//! failures are only counted and logged; otherwise the run is halted once the
//! count reaches the limit.

use tracing::{error, warn};

use crate::emit;
use crate::metrics::events::FailureRecorded;
use crate::record::ErrorRecord;

/// What the drain loop should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// Keep draining.
    Continue,
    /// The limit was reached; cancel the run.
    Halt { count: usize },
}

/// Tracks failures seen by the sink and enforces `max_failures`.
#[derive(Debug)]
pub struct FailureTracker {
    count: usize,
    max_failures: usize,
    /// Pipeline identifier for metrics labeling.
    pipeline: String,
}

impl FailureTracker {
    /// Create a new failure tracker.
    ///
    /// # Arguments
    /// * `max_failures` - Failures tolerated before halting (0 = unlimited)
    /// * `pipeline` - Pipeline identifier for metrics labeling
    pub fn new(max_failures: usize, pipeline: impl Into<String>) -> Self {
        Self {
            count: 0,
            max_failures,
            pipeline: pipeline.into(),
        }
    }

    /// Record a failure, emit metrics, and check the limit.
    ///
    /// Only the call that reaches the limit returns [`FailureVerdict::Halt`].
    pub fn record(&mut self, record: &ErrorRecord) -> FailureVerdict {
        self.count += 1;
        emit!(FailureRecorded {
            stage: record.stage.clone(),
            pipeline: self.pipeline.clone(),
        });
        warn!(pipeline = %self.pipeline, failures = self.count, "{record}");

        if self.max_failures > 0 && self.count == self.max_failures {
            error!("Max failures ({}) reached, stopping pipeline", self.count);
            return FailureVerdict::Halt { count: self.count };
        }

        FailureVerdict::Continue
    }

    /// Returns true if any failures were recorded.
    pub fn has_failures(&self) -> bool {
        self.count > 0
    }

    /// Returns the failure count.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn max_failures(&self) -> usize {
        self.max_failures
    }
}
