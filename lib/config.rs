//! Typed options for the directory cache.
//!
//! Options are read from a TOML file. Keys keep the dotted, camel-cased paths of the client
//! configuration they come from, written either as dotted keys or as tables:
//!
//! ```toml
//! fs.dirCache.lruSize = 5000000
//!
//! [fs.dirCache.reclaim]
//! queueCapacity = 4096
//! workers = 1
//! policy = "block"
//! ```
//!
//! `fs.dirCache.lruSize` has no default. A configuration without it fails to load.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

fn default_queue_capacity() -> usize {
    4096
}

fn default_workers() -> usize {
    1
}

/// What a producer does when the reclaim queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Block until a worker frees a slot.
    #[default]
    Block,
    /// Reclaim on the producer's thread.
    Inline,
}

/// Options for the background reclaim queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclaimOption {
    /// Number of slots in the queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of worker threads draining the queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Behavior when the queue is full.
    #[serde(default)]
    pub policy: BackpressurePolicy,
}

impl Default for ReclaimOption {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            policy: BackpressurePolicy::default(),
        }
    }
}

/// Options for [`DirCache`](crate::fs::dir_cache::DirCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirCacheOption {
    /// Maximum number of cached child entries, summed over every cached directory.
    pub lru_size: usize,

    /// Reclaim queue settings.
    #[serde(default)]
    pub reclaim: ReclaimOption,
}

impl DirCacheOption {
    /// Options with the given capacity and default reclaim settings.
    #[must_use]
    pub fn new(lru_size: usize) -> Self {
        Self {
            lru_size,
            reclaim: ReclaimOption::default(),
        }
    }
}

/// The `fs` section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemOption {
    /// Directory cache options.
    pub dir_cache: DirCacheOption,
}

/// Application configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem client options.
    pub fs: FileSystemOption,
}

/// Errors raised while loading a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file parsed but holds invalid values.
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    /// The file is not valid TOML, or misses a required key.
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    /// The file could not be read.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// No path was given and none of the search paths exist.
    #[error("No configuration file found in {0:?}.")]
    NotFound(Vec<PathBuf>),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns every problem found, not just the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let dir_cache = &self.fs.dir_cache;

        if dir_cache.lru_size == 0 {
            errors.push("fs.dirCache.lruSize must be greater than zero.".to_owned());
        }
        if dir_cache.reclaim.queue_capacity == 0 {
            errors.push("fs.dirCache.reclaim.queueCapacity must be greater than zero.".to_owned());
        }
        if dir_cache.reclaim.workers == 0 {
            errors.push("fs.dirCache.reclaim.workers must be greater than zero.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate().map_err(ConfigError::ValidationErrors)?;
        Ok(config)
    }

    /// Returns config file paths in descending priority order.
    #[must_use]
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("dircache").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".config").join("dircache").join("config.toml");
            if !paths.contains(&path) {
                paths.push(path);
            }
        }

        paths.push(PathBuf::from("/etc/dircache/config.toml"));

        paths
    }

    /// Loads config from a single TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Loads configuration from `external_config_path` if given, otherwise from the first
    /// existing search path.
    pub fn load(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = external_config_path {
            return Self::load_from_file(path);
        }

        let candidates = Self::config_search_paths();
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load_from_file(path),
            None => Err(ConfigError::NotFound(candidates)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn dotted_keys_parse() {
        let config = Config::from_toml_str("fs.dirCache.lruSize = 5000000\n").unwrap();
        assert_eq!(config.fs.dir_cache.lru_size, 5_000_000);
        assert_eq!(config.fs.dir_cache.reclaim, ReclaimOption::default());
    }

    #[test]
    fn nested_tables_parse() {
        let config = Config::from_toml_str(
            r#"
            [fs.dirCache]
            lruSize = 100

            [fs.dirCache.reclaim]
            queueCapacity = 8
            workers = 2
            policy = "inline"
            "#,
        )
        .unwrap();
        let dir_cache = &config.fs.dir_cache;
        assert_eq!(dir_cache.lru_size, 100);
        assert_eq!(dir_cache.reclaim.queue_capacity, 8);
        assert_eq!(dir_cache.reclaim.workers, 2);
        assert_eq!(dir_cache.reclaim.policy, BackpressurePolicy::Inline);
    }

    #[test]
    fn missing_lru_size_is_fatal() {
        let err = Config::from_toml_str("[fs.dirCache]\n").unwrap_err();
        assert!(matches!(err, ConfigError::DeserializationError(_)));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = Config::from_toml_str(
            "fs.dirCache.lruSize = 1\nfs.dirCache.reclaim.policy = \"drop\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DeserializationError(_)));
    }

    #[test]
    fn validation_reports_every_problem() {
        let err = Config::from_toml_str(
            r"
            fs.dirCache.lruSize = 0
            fs.dirCache.reclaim.queueCapacity = 0
            fs.dirCache.reclaim.workers = 0
            ",
        )
        .unwrap_err();
        match err {
            ConfigError::ValidationErrors(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "fs.dirCache.lruSize = 42\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.fs.dir_cache.lru_size, 42);
    }

    #[test]
    fn load_missing_explicit_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
