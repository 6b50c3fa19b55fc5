//! Website checker pipeline assembled from configuration.
//!
//! Every configured stage maps `String -> String`. A `head_check` stage turns
//! a url into `OK:<url>` or an error record carrying `ERR:<url> ...`; an
//! `uppercase` stage upper-cases whatever reaches it.

use std::sync::Arc;

use snafu::ResultExt;
use tracing::info;

use sluice_core::{
    CancelCause, ErrorRecord, IterSource, Pipeline, PipelineBuilder, PipelineError, RunSummary,
    Sink, StageSpec,
};

use crate::config::{Config, StageConfig, StageKind};
use crate::error::{CheckerError, ConstructionSnafu, ProbeSnafu};
use crate::probe::{HttpProbe, Probe};

const PIPELINE_NAME: &str = "sluice";

/// Exit status for a run stopped by a signal (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

/// Stage that probes each url and reports `OK:<url>` for status 200.
pub fn head_check_stage(
    name: impl Into<String>,
    width: usize,
    probe: Arc<dyn Probe>,
) -> StageSpec<String, String> {
    StageSpec::new(name, width, move |url: String| {
        let probe = probe.clone();
        async move {
            match probe.check(&url).await {
                Ok(200) => Ok(format!("OK:{url}")),
                Ok(status) => {
                    let message = format!("ERR:{url} status {status}");
                    Err(ErrorRecord::new(url, message))
                }
                Err(e) => {
                    let message = format!("ERR:{url} {e}");
                    Err(ErrorRecord::new(url, message))
                }
            }
        }
    })
}

/// Stage that upper-cases every string. Never fails.
pub fn uppercase_stage(name: impl Into<String>, width: usize) -> StageSpec<String, String> {
    StageSpec::from_fn(name, width, |s: String| Ok(s.to_uppercase()))
}

/// Builds the checker pipeline from a validated [`Config`].
pub struct Checker {
    config: Config,
    probe: Option<Arc<dyn Probe>>,
}

impl Checker {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            probe: None,
        }
    }

    /// Use `probe` for every head_check stage instead of an HTTP client.
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stage specs in configured order.
    pub fn stages(&self) -> Result<Vec<StageSpec<String, String>>, CheckerError> {
        self.config
            .stages
            .iter()
            .map(|(name, stage)| self.stage(name, stage))
            .collect()
    }

    fn stage(&self, name: &str, stage: &StageConfig) -> Result<StageSpec<String, String>, CheckerError> {
        let width = stage.width.resolve();
        let spec = match stage.kind {
            StageKind::HeadCheck => {
                let probe: Arc<dyn Probe> = match &self.probe {
                    Some(probe) => probe.clone(),
                    None => Arc::new(
                        HttpProbe::new(stage.timeout()).context(ProbeSnafu { stage: name })?,
                    ),
                };
                head_check_stage(name, width, probe)
            }
            StageKind::Uppercase => uppercase_stage(name, width),
        };
        info!(stage = name, kind = %stage.kind, width, "Configured stage");
        Ok(spec)
    }

    /// Assemble the pipeline, draining into `sink`.
    pub fn build<S>(&self, sink: S) -> Result<Pipeline<String, S>, CheckerError>
    where
        S: Sink<String>,
    {
        let source = IterSource::new(self.config.source.urls.clone());
        let mut builder = PipelineBuilder::new(source)
            .name(PIPELINE_NAME)
            .capacity(self.config.global.channel_capacity)
            .max_failures(self.config.error_handling.max_failures);
        if let Some(deadline) = self.config.global.deadline() {
            builder = builder.deadline(deadline);
        }

        self.stages()?
            .into_iter()
            .fold(builder, |builder, spec| builder.stage(spec))
            .build(sink)
            .context(ConstructionSnafu)
    }
}

/// Process exit status for the outcome of a run.
///
/// Item failures do not affect it; only how the run ended does.
pub fn exit_status(outcome: &Result<RunSummary, PipelineError>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(e) if e.cancel_cause() == Some(CancelCause::Requested) => EXIT_INTERRUPTED,
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use async_trait::async_trait;
    use sluice_core::CollectingSink;

    struct FixedStatus(u16);

    #[async_trait]
    impl Probe for FixedStatus {
        async fn check(&self, _url: &str) -> Result<u16, ProbeError> {
            Ok(self.0)
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Probe for Unreachable {
        async fn check(&self, url: &str) -> Result<u16, ProbeError> {
            Err(ProbeError::Unreachable {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    async fn run_one(stage: StageSpec<String, String>) -> CollectingSink<String> {
        let mut sink = CollectingSink::new();
        sluice_core::build_pipeline(
            IterSource::new(vec!["http://a".to_string()]),
            vec![stage],
            &mut sink,
        )
        .unwrap()
        .execute()
        .await
        .unwrap();
        sink
    }

    #[tokio::test]
    async fn test_head_check_ok() {
        let sink = run_one(head_check_stage("check", 1, Arc::new(FixedStatus(200)))).await;
        assert_eq!(sink.results, vec!["OK:http://a"]);
        assert!(sink.errors.is_empty());
    }

    #[tokio::test]
    async fn test_head_check_bad_status() {
        let sink = run_one(head_check_stage("check", 1, Arc::new(FixedStatus(503)))).await;
        assert!(sink.results.is_empty());
        assert_eq!(sink.errors[0].item, "http://a");
        assert_eq!(sink.errors[0].message, "ERR:http://a status 503");
    }

    #[tokio::test]
    async fn test_head_check_transport_failure() {
        let sink = run_one(head_check_stage("check", 1, Arc::new(Unreachable))).await;
        assert_eq!(sink.errors[0].message, "ERR:http://a connection refused");
    }

    #[test]
    fn test_exit_status() {
        let summary = RunSummary {
            results: 5,
            errors: 2,
            elapsed: std::time::Duration::from_millis(10),
        };
        let cancelled = |cause| -> Result<RunSummary, PipelineError> {
            Err(PipelineError::Cancelled { cause, summary })
        };

        assert_eq!(exit_status(&Ok(summary)), 0);
        assert_eq!(exit_status(&cancelled(CancelCause::Requested)), EXIT_INTERRUPTED);
        assert_eq!(exit_status(&cancelled(CancelCause::Deadline)), 1);
        assert_eq!(exit_status(&cancelled(CancelCause::MaxFailures { count: 3 })), 1);
        let panicked: Result<RunSummary, PipelineError> = Err(PipelineError::TaskPanicked {
            component: "check/worker-0".to_string(),
            message: "boom".to_string(),
        });
        assert_eq!(exit_status(&panicked), 1);
    }

    #[tokio::test]
    async fn test_uppercase() {
        let sink = run_one(uppercase_stage("shout", 2)).await;
        assert_eq!(sink.results, vec!["HTTP://A"]);
    }
}
