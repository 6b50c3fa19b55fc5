//! Reachability probes for urls.

use std::time::Duration;

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::trace;

use crate::error::{ClientBuildSnafu, ProbeError, RequestSnafu};

/// Something that can report the HTTP status of a url.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Status code returned for `url`, or why no response was received.
    async fn check(&self, url: &str) -> Result<u16, ProbeError>;
}

/// Probe issuing `HEAD` requests.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context(ClientBuildSnafu)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, url: &str) -> Result<u16, ProbeError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .context(RequestSnafu { url })?;
        let status = response.status().as_u16();
        trace!(url, status, "HEAD completed");
        Ok(status)
    }
}
