//! Per-item failure records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record describing one item whose stage function failed.
///
/// The stage function supplies the item's encoded form and a message; the
/// engine fills in which stage and worker produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Encoded form of the failing item.
    pub item: String,
    /// Error message describing the failure.
    pub message: String,
    /// Stage that produced the record.
    pub stage: Option<String>,
    /// Worker index within the stage.
    pub worker: Option<usize>,
    /// Timestamp when the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            message: message.into(),
            stage: None,
            worker: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a record from any error value.
    pub fn from_error(item: impl Into<String>, error: &dyn std::error::Error) -> Self {
        Self::new(item, error.to_string())
    }

    /// Tag the record with its origin. Existing tags are kept.
    pub(crate) fn with_origin(mut self, stage: &str, worker: usize) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage.to_string());
            self.worker = Some(worker);
        }
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.stage, self.worker) {
            (Some(stage), Some(worker)) => {
                write!(f, "[{stage}#{worker}] {}: {}", self.item, self.message)
            }
            (Some(stage), None) => write!(f, "[{stage}] {}: {}", self.item, self.message),
            _ => write!(f, "{}: {}", self.item, self.message),
        }
    }
}
