//! Sluice: concurrent website status checker.
//!
//! This crate handles:
//! - Loading and merging YAML configuration with environment interpolation
//! - Probing urls with HTTP `HEAD` requests
//! - Assembling the configured stages into a `sluice-core` pipeline

pub mod checker;
pub mod config;
pub mod error;
pub mod probe;

// Re-export commonly used items
pub use checker::{Checker, EXIT_INTERRUPTED, exit_status, head_check_stage, uppercase_stage};
pub use config::{CliArgs, Config, ConfigPath};
pub use error::{CheckerError, ConfigError, ProbeError};
pub use probe::{HttpProbe, Probe};

// Re-export from sluice-core
pub use sluice_core::{LoggingSink, init_metrics, init_tracing, shutdown_signal};
