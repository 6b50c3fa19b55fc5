//! Multi-file configuration loading.

use std::path::Path;

use snafu::ResultExt;
use tracing::debug;

use super::{Config, ConfigPath, interpolate, is_yaml_file};
use crate::error::{ConfigError, ReadDirSnafu, ReadFileSnafu};

/// Load and merge every source in order. Errors from all sources are reported together.
pub fn load_from_paths(paths: &[ConfigPath]) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    let mut errors = Vec::new();

    for source in paths {
        let loaded = match source {
            ConfigPath::File(path) => load_file(path),
            ConfigPath::Dir(path) => load_dir(path),
        };
        if let Err(e) = loaded.and_then(|partial| config.merge(partial)) {
            errors.push(format!("{}: {}", source.path().display(), e));
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}

fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
    debug!(path = %path.display(), "Loaded config file");
    Config::parse_partial(&interpolate(&contents)?)
}

fn load_dir(dir: &Path) -> Result<Config, ConfigError> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .context(ReadDirSnafu { path: dir })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();
    files.sort();

    let mut config = Config::default();
    let mut errors = Vec::new();

    for path in files {
        if let Err(e) = load_file(&path).and_then(|partial| config.merge(partial)) {
            errors.push(format!("{}: {}", path.display(), e));
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}
