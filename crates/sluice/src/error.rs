//! Error types for the sluice checker.

use std::path::PathBuf;

use snafu::prelude::*;

use sluice_core::ConstructionError;

// ============ Config Errors ============

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// No urls to check.
    #[snafu(display("source.urls must contain at least one url"))]
    EmptyUrls,

    /// A url entry is blank.
    #[snafu(display("source.urls[{index}] is empty"))]
    BlankUrl { index: usize },

    /// No stages configured.
    #[snafu(display("At least one stage must be configured"))]
    NoStages,

    /// A stage was given zero workers.
    #[snafu(display("Stage '{stage}' has width 0 (use a positive integer or \"auto\")"))]
    ZeroWidth { stage: String },

    /// A head_check stage with a zero timeout would fail every request.
    #[snafu(display("Stage '{stage}' has timeout_secs 0"))]
    ZeroTimeout { stage: String },

    /// Run deadline of zero.
    #[snafu(display("global.deadline_secs must be greater than 0"))]
    ZeroDeadline,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Failed to read configuration directory.
    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: PathBuf },

    /// The same stage name appears in more than one file.
    #[snafu(display("Duplicate stage names: {}", stages.join(", ")))]
    DuplicateStages { stages: Vec<String> },

    /// Multiple configuration errors occurred.
    #[snafu(display("Multiple config errors:\n{}", errors.join("\n")))]
    MultipleErrors { errors: Vec<String> },
}

// ============ Probe Errors ============

/// Errors from probing a url.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProbeError {
    /// Failed to build the HTTP client.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// The request did not produce a response.
    #[snafu(display("{source}"))]
    Request { url: String, source: reqwest::Error },

    /// Transport failure reported by a non-HTTP probe.
    #[snafu(display("{message}"))]
    Unreachable { url: String, message: String },
}

// ============ Checker Errors ============

/// Errors turning a configuration into a runnable pipeline.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckerError {
    /// A probe for a head_check stage could not be created.
    #[snafu(display("Stage '{stage}': {source}"))]
    Probe { stage: String, source: ProbeError },

    /// The engine rejected the assembled pipeline.
    #[snafu(display("{source}"))]
    Construction { source: ConstructionError },
}
