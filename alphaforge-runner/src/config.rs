//! Serializable batch configuration.
//!
//! A run is described by one TOML file with four tables, all optional:
//! `[scope]` (catalog filters), `[grammar]` (generation operators),
//! `[simulation]` (settings attached to every job), `[batch]` (concurrency
//! and timing). Missing tables fall back to their defaults, so the empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use alphaforge_core::catalog::FieldFilters;
use alphaforge_core::generator::GenerationGrammar;
use alphaforge_core::poll::PollConfig;
use alphaforge_core::submit::SimulationSettings;

/// Concurrency and timing knobs for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker count; at most this many jobs are in flight at once.
    pub concurrency_limit: usize,
    /// Fallback poll interval when the server sends no Retry-After hint.
    pub poll_interval_secs: f64,
    /// Per-job wait budget before the poller gives up.
    pub max_wait_secs: u64,
    /// Grace window after cancellation during which in-flight jobs may still
    /// finish.
    pub cancel_grace_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            poll_interval_secs: 2.0,
            max_wait_secs: 30 * 60,
            cancel_grace_secs: 30,
        }
    }
}

impl BatchSettings {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            default_interval: Duration::from_secs_f64(self.poll_interval_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
            cancel_grace: Duration::from_secs(self.cancel_grace_secs),
        }
    }
}

/// Everything needed to reproduce a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub scope: FieldFilters,
    pub grammar: GenerationGrammar,
    pub simulation: SimulationSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl BatchConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.concurrency_limit == 0 {
            return Err(ConfigError::Invalid(
                "batch.concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.batch.max_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "batch.max_wait_secs must be positive".to_string(),
            ));
        }
        if !self.batch.poll_interval_secs.is_finite() || self.batch.poll_interval_secs < 0.0 {
            return Err(ConfigError::Invalid(
                "batch.poll_interval_secs must be a finite, non-negative number".to_string(),
            ));
        }
        if !self.grammar.ts_ops.is_empty() && self.grammar.lookback_days.is_empty() {
            return Err(ConfigError::Invalid(
                "grammar.lookback_days must not be empty when grammar.ts_ops is set".to_string(),
            ));
        }
        Ok(())
    }
}
