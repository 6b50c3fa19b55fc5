//! Cooperative cancellation for a single pipeline run.
//!
//! Every component receives an owned [`Shutdown`] clone when it is spawned.
//! Components only observe it; the run itself, the sink's failure policy,
//! the deadline timer and external [`CancelHandle`]s are the only writers.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// An external caller (signal handler, test, embedding program) asked to stop.
    Requested,
    /// The configured run deadline elapsed.
    Deadline,
    /// The failure policy reached its limit.
    MaxFailures { count: usize },
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "cancellation requested"),
            Self::Deadline => write!(f, "deadline exceeded"),
            Self::MaxFailures { count } => write!(f, "max failures reached ({count})"),
        }
    }
}

/// Broadcast cancellation signal shared by every component of one run.
///
/// Clones share state. Once cancelled it stays cancelled; the first cause
/// recorded wins and later calls have no further effect.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
}

impl Shutdown {
    /// Create a fresh, uncancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the run. Returns `true` only for the call that set the cause.
    pub fn cancel(&self, cause: CancelCause) -> bool {
        // Cause is published before the token fires so observers always see it.
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        if first {
            info!(cause = %cause, "Pipeline cancellation triggered");
        }
        first
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the run is cancelled. Usable as a `select!` branch.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The recorded cause, if cancelled.
    pub fn cause(&self) -> Option<CancelCause> {
        self.cause.get().copied()
    }

    /// The underlying token, for `run_until_cancelled` and similar helpers.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// External handle for stopping a pipeline from outside `execute()`.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shutdown: Shutdown,
}

impl CancelHandle {
    pub(crate) fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }

    /// Request cancellation. Idempotent; returns `true` if this call was first.
    pub fn cancel(&self) -> bool {
        self.shutdown.cancel(CancelCause::Requested)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
