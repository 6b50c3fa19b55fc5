//! Configuration for the sluice website checker.
//!
//! ```yaml
//! source:
//!   urls: ["http://google.com", "http://golang.org"]
//! stages:
//!   check: { kind: head_check, width: 2, timeout_secs: 10 }
//!   shout: { kind: uppercase, width: auto }
//! global:
//!   channel_capacity: 0
//!   deadline_secs: 60
//! error_handling:
//!   max_failures: 0
//! metrics:
//!   address: "0.0.0.0:9090"
//! ```

mod loader;
mod path;
mod vars;

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use sluice_core::available_width;

use crate::error::{ConfigError, YamlParseSnafu};

pub use loader::load_from_paths;
pub use path::{CliArgs, ConfigPath, is_yaml_file};
pub use vars::{interpolate, interpolate_with};

/// Urls fed to the pipeline, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Stage implementations available from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// HTTP HEAD request; status 200 passes, anything else is an error record.
    HeadCheck,
    /// Upper-cases each result string.
    Uppercase,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::HeadCheck => write!(f, "head_check"),
            StageKind::Uppercase => write!(f, "uppercase"),
        }
    }
}

/// Fan-out width of a stage: a fixed worker count or one per available CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Fixed(usize),
    Auto,
}

impl Default for Width {
    fn default() -> Self {
        Width::Fixed(1)
    }
}

impl Width {
    /// Worker count to launch.
    pub fn resolve(self) -> usize {
        match self {
            Width::Fixed(n) => n,
            Width::Auto => available_width(),
        }
    }
}

impl Serialize for Width {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Width::Fixed(n) => serializer.serialize_u64(*n as u64),
            Width::Auto => serializer.serialize_str("auto"),
        }
    }
}

impl<'de> Deserialize<'de> for Width {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(usize),
            Named(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Width::Fixed(n)),
            Raw::Named(name) if name == "auto" => Ok(Width::Auto),
            Raw::Named(other) => Err(de::Error::custom(format!(
                "invalid width '{other}': expected a positive integer or \"auto\""
            ))),
        }
    }
}

/// One stage of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub kind: StageKind,
    #[serde(default)]
    pub width: Width,
    /// Per-request timeout for head_check stages.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl StageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Run-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Buffer size of every stream (0 = rendezvous).
    #[serde(default)]
    pub channel_capacity: usize,
    /// Cancel the run after this many seconds.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl GlobalConfig {
    /// Merge values from another GlobalConfig (last-write-wins for set values).
    pub fn merge_from(&mut self, other: Self) {
        if other.channel_capacity != 0 {
            self.channel_capacity = other.channel_capacity;
        }
        if other.deadline_secs.is_some() {
            self.deadline_secs = other.deadline_secs;
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Failure policy applied by the sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorHandlingConfig {
    /// Maximum failures before stopping the run (0 = unlimited, default: 0).
    #[serde(default)]
    pub max_failures: usize,
}

impl ErrorHandlingConfig {
    pub fn merge_from(&mut self, other: Self) {
        if other.max_failures != 0 {
            self.max_failures = other.max_failures;
        }
    }
}

/// Prometheus exporter settings. No address means no exporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub address: Option<String>,
}

impl MetricsConfig {
    pub fn merge_from(&mut self, other: Self) {
        if other.address.is_some() {
            self.address = other.address;
        }
    }
}

/// Main configuration for sluice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    /// Stages in pipeline order.
    #[serde(default)]
    pub stages: IndexMap<String, StageConfig>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load, merge and validate configuration from multiple sources.
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let config = load_from_paths(paths)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single file.
    pub fn from_file(path: impl Into<std::path::PathBuf>) -> Result<Self, ConfigError> {
        Self::from_paths(&[ConfigPath::file(path)])
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_partial(&interpolate(contents)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse one already-interpolated fragment without validating it.
    pub(crate) fn parse_partial(contents: &str) -> Result<Self, ConfigError> {
        // An empty file is an empty fragment.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).context(YamlParseSnafu)
    }

    /// Fold `other` into this config. Stage names must be unique across sources.
    pub fn merge(&mut self, other: Self) -> Result<(), ConfigError> {
        let duplicates: Vec<String> = other
            .stages
            .keys()
            .filter(|name| self.stages.contains_key(*name))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(ConfigError::DuplicateStages { stages: duplicates });
        }

        self.source.urls.extend(other.source.urls);
        self.stages.extend(other.stages);
        self.global.merge_from(other.global);
        self.error_handling.merge_from(other.error_handling);
        self.metrics.merge_from(other.metrics);
        Ok(())
    }

    /// Validate the merged configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.source.urls.is_empty() {
            problems.push(ConfigError::EmptyUrls);
        }
        for (index, url) in self.source.urls.iter().enumerate() {
            if url.trim().is_empty() {
                problems.push(ConfigError::BlankUrl { index });
            }
        }
        if self.stages.is_empty() {
            problems.push(ConfigError::NoStages);
        }
        for (name, stage) in &self.stages {
            if stage.width == Width::Fixed(0) {
                problems.push(ConfigError::ZeroWidth {
                    stage: name.clone(),
                });
            }
            if stage.kind == StageKind::HeadCheck && stage.timeout_secs == 0 {
                problems.push(ConfigError::ZeroTimeout {
                    stage: name.clone(),
                });
            }
        }
        if self.global.deadline_secs == Some(0) {
            problems.push(ConfigError::ZeroDeadline);
        }

        match problems.len() {
            0 => Ok(()),
            1 => Err(problems.remove(0)),
            _ => Err(ConfigError::MultipleErrors {
                errors: problems.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    pub fn url_count(&self) -> usize {
        self.source.urls.len()
    }
}
