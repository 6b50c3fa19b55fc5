//! Command-line arguments and configuration sources.

use std::path::{Path, PathBuf};

use clap::Parser;

use super::Config;

/// A configuration source: a single file or a directory of YAML files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigPath {
    File(PathBuf),
    Dir(PathBuf),
}

impl ConfigPath {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::Dir(path.into())
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Dir(path) => path,
        }
    }
}

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Check a list of websites concurrently and report their status.
#[derive(Parser, Debug)]
#[command(version)]
pub struct CliArgs {
    /// Path to configuration file (can be specified multiple times)
    #[arg(short, long)]
    pub config: Vec<PathBuf>,

    /// Path to configuration directory (can be specified multiple times)
    #[arg(short = 'C', long = "config-dir")]
    pub config_dirs: Vec<PathBuf>,

    /// Override error_handling.max_failures
    #[arg(long)]
    pub max_failures: Option<usize>,

    /// Override global.deadline_secs
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

impl CliArgs {
    /// Files first, then directories, each group in the order given.
    pub fn config_paths(&self) -> Vec<ConfigPath> {
        self.config
            .iter()
            .map(ConfigPath::file)
            .chain(self.config_dirs.iter().map(ConfigPath::dir))
            .collect()
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(max_failures) = self.max_failures {
            config.error_handling.max_failures = max_failures;
        }
        if let Some(deadline_secs) = self.deadline_secs {
            config.global.deadline_secs = Some(deadline_secs);
        }
    }
}
