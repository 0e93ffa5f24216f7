//! Pipeline configuration
//!
//! Knobs for retry bounds, fan-out concurrency, collaborator timeouts,
//! and output ceilings. Loadable from a YAML file; every field has a
//! default so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Configuration for one extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum reject decisions before the run terminates with a
    /// retry-limit-exceeded status instead of looping.
    pub max_validation_retries: u32,
    /// How many times the gate re-solicits a malformed decision from a
    /// wired handler before giving up.
    pub max_decision_solicitations: u32,
    /// Executor-level attempts for generation-required stages whose
    /// failure has no degrade path (concept extraction, keyword
    /// generation).
    pub stage_retry_attempts: u32,
    /// Concurrent per-item calls within one fan-out batch.
    pub fanout_concurrency: usize,
    /// Per-call timeout applied to every collaborator invocation.
    pub collaborator_timeout_secs: u64,
    /// Ceiling on generated boolean queries.
    pub max_queries: usize,
    /// Results requested per search call.
    pub max_search_results: usize,
    /// Context snippets gathered per keyword before synonym generation.
    pub snippet_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_validation_retries: 3,
            max_decision_solicitations: 3,
            stage_retry_attempts: 2,
            fanout_concurrency: 4,
            collaborator_timeout_secs: 30,
            max_queries: 6,
            max_search_results: 5,
            snippet_limit: 3,
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file. Missing fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn with_max_validation_retries(mut self, limit: u32) -> Self {
        self.max_validation_retries = limit;
        self
    }

    pub fn with_fanout_concurrency(mut self, limit: usize) -> Self {
        self.fanout_concurrency = limit;
        self
    }

    pub fn with_collaborator_timeout_secs(mut self, secs: u64) -> Self {
        self.collaborator_timeout_secs = secs;
        self
    }

    pub fn with_max_queries(mut self, limit: usize) -> Self {
        self.max_queries = limit;
        self
    }
}
