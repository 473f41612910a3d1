//! Build and evaluation settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for graph construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Remove relations implied by longer paths after construction.
    pub transitive_reduction: bool,

    /// Mark relations that close a dependency cycle so evaluation skips them.
    pub detect_cycles: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            transitive_reduction: true,
            detect_cycles: true,
        }
    }
}

impl BuildConfig {
    pub fn with_transitive_reduction(mut self, enabled: bool) -> Self {
        self.transitive_reduction = enabled;
        self
    }

    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }
}

/// Settings for the worker pool that runs operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Worker count; 0 lets rayon pick one per logical CPU.
    pub threads: usize,

    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            thread_name: "evalgraph-worker".to_string(),
        }
    }
}

impl EvalConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Combined settings, as read from a JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub build: BuildConfig,
    pub eval: EvalConfig,
}

impl Config {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.build.transitive_reduction);
        assert!(config.build.detect_cycles);
        assert_eq!(config.eval.threads, 0);
        assert_eq!(config.eval.thread_name, "evalgraph-worker");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{"eval": {"threads": 4}}"#).unwrap();
        assert_eq!(config.eval.threads, 4);
        assert_eq!(config.eval.thread_name, "evalgraph-worker");
        assert!(config.build.transitive_reduction);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evalgraph.json");
        std::fs::write(&path, r#"{"build": {"transitive_reduction": false}}"#).unwrap();

        let config = Config::from_path(&path).unwrap();
        assert!(!config.build.transitive_reduction);
        assert!(config.build.detect_cycles);
        assert!(Config::from_path(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_builder_setters() {
        let build = BuildConfig::default().with_cycle_detection(false);
        assert!(!build.detect_cycles);
        let eval = EvalConfig::default().with_threads(2).with_thread_name("pool");
        assert_eq!((eval.threads, eval.thread_name.as_str()), (2, "pool"));
    }
}
