// src/config/file.rs
// File-based configuration from ~/.testgen-orchestrator/config.toml

use crate::batch::BatchConfig;
use crate::orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Top-level on-disk config structure.
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorFileSection,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// The subset of `OrchestratorConfig` a user may reasonably override from a
/// config file; fields with no sensible static default (paths resolved at
/// runtime) are left to CLI flags.
#[derive(Debug, Deserialize, Default)]
pub struct OrchestratorFileSection {
    pub max_concurrent: Option<usize>,
    pub model: Option<String>,
    pub fallback_model: Option<String>,
    pub max_retries: Option<u32>,
    pub exponential_backoff: Option<bool>,
    pub circuit_breaker_enabled: Option<bool>,
    pub circuit_breaker_threshold: Option<u32>,
    pub graceful_degradation: Option<bool>,
}

impl FileConfig {
    /// Load config from `~/.testgen-orchestrator/config.toml`. Missing file
    /// or parse failure both fall back to defaults rather than erroring --
    /// this file is a convenience layer, not a requirement.
    pub fn load() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config from file");
                    config
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
        }
    }

    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| {
                warn!("HOME directory not set; using current directory for config lookup");
                PathBuf::from(".")
            })
            .join(".testgen-orchestrator")
            .join("config.toml")
    }

    /// Apply the file's overrides onto a base `OrchestratorConfig`, which
    /// itself should already carry any CLI-flag overrides (CLI > file > built-in
    /// defaults, per `OrchestratorConfig::default()`).
    pub fn apply_to_orchestrator(&self, mut base: OrchestratorConfig) -> OrchestratorConfig {
        let section = &self.orchestrator;
        if let Some(v) = section.max_concurrent {
            base.max_concurrent = v;
        }
        if let Some(ref v) = section.model {
            base.model = v.clone();
        }
        if section.fallback_model.is_some() {
            base.fallback_model = section.fallback_model.clone();
        }
        if let Some(v) = section.max_retries {
            base.max_retries = v;
        }
        if let Some(v) = section.exponential_backoff {
            base.exponential_backoff = v;
        }
        if let Some(v) = section.circuit_breaker_enabled {
            base.circuit_breaker_enabled = v;
        }
        if let Some(v) = section.circuit_breaker_threshold {
            base.circuit_breaker_threshold = v;
        }
        if let Some(v) = section.graceful_degradation {
            base.graceful_degradation = v;
        }
        base
    }
}
