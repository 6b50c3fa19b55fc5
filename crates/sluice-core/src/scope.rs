//! Structured task ownership for one pipeline run.
//!
//! Every task a run spawns (source, stage workers, merge supervisors) is
//! registered in the run's [`RunScope`]. The run joins the scope before it
//! returns, and dropping a scope aborts whatever is still alive, so no
//! component outlives its run.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error};

use crate::cancel::Shutdown;

/// Abnormal termination of a component task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task panicked during execution.
    Panicked { component: String, message: String },
    /// Task was aborted before completing.
    Aborted { component: String },
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panicked { component, message } => {
                write!(f, "{component} panicked: {message}")
            }
            Self::Aborted { component } => write!(f, "{component} aborted"),
        }
    }
}

impl std::error::Error for TaskError {}

impl TaskError {
    pub fn component(&self) -> &str {
        match self {
            Self::Panicked { component, .. } | Self::Aborted { component } => component,
        }
    }

    pub fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

/// Owner of every task spawned during one run.
pub struct RunScope {
    tasks: JoinSet<()>,
    components: HashMap<Id, String>,
    shutdown: Shutdown,
    capacity: usize,
}

impl RunScope {
    /// Create a scope whose streams use `capacity` and whose tasks observe `shutdown`.
    pub fn new(shutdown: Shutdown, capacity: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            components: HashMap::new(),
            shutdown,
            capacity,
        }
    }

    /// The run's cancellation signal.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Capacity for streams created in this run.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Spawn a component task into the scope.
    pub fn spawn<F>(&mut self, component: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let component = component.into();
        let handle = self.tasks.spawn(future);
        debug!(component = %component, "Spawned component task");
        self.components.insert(handle.id(), component);
    }

    /// Number of tasks not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task and report the ones that ended abnormally.
    pub async fn join_all(&mut self) -> Vec<TaskError> {
        let mut failures = Vec::new();

        while let Some(result) = self.tasks.join_next_with_id().await {
            match result {
                Ok((id, ())) => {
                    self.components.remove(&id);
                }
                Err(e) => {
                    let component = self
                        .components
                        .remove(&e.id())
                        .unwrap_or_else(|| "unknown".to_string());
                    let failure = task_error(component, e);
                    error!(error = %failure, "Component task failed");
                    failures.push(failure);
                }
            }
        }

        failures
    }
}

fn task_error(component: String, err: JoinError) -> TaskError {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        TaskError::Panicked { component, message }
    } else {
        TaskError::Aborted { component }
    }
}
