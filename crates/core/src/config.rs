use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TempoError};
use crate::report::verbosity;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.parse().ok())
}

// ── Engine config ─────────────────────────────────────────────

/// Phase engine configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ready-to-end extension rounds allowed before the run is aborted.
    #[serde(default = "default_max_ready_to_end")]
    pub max_ready_to_end_iterations: u32,
    /// Global run timeout in logical seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// INFO reports above this verbosity are filtered.
    #[serde(default = "default_verbosity")]
    pub verbosity: u32,
    /// Log every phase state transition at debug level.
    #[serde(default)]
    pub trace_phases: bool,
    /// Logical time a task phase waits after its last objection drops.
    #[serde(default)]
    pub objection_drain_secs: u64,
    /// Capacity given to gates created lazily by the global gate pool.
    #[serde(default = "default_gate_capacity")]
    pub default_gate_capacity: usize,
}

fn default_max_ready_to_end() -> u32 { 20 }
fn default_timeout_secs() -> u64 { 9200 }
fn default_verbosity() -> u32 { verbosity::MEDIUM }
fn default_gate_capacity() -> usize { 1 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ready_to_end_iterations: default_max_ready_to_end(),
            timeout_secs: default_timeout_secs(),
            verbosity: default_verbosity(),
            trace_phases: false,
            objection_drain_secs: 0,
            default_gate_capacity: default_gate_capacity(),
        }
    }
}

impl EngineConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus env overrides (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parsed("TEMPO_MAX_READY_TO_END") {
            self.max_ready_to_end_iterations = v;
        }
        if let Some(v) = env_parsed("TEMPO_TIMEOUT_SECS") {
            self.timeout_secs = v;
        }
        if let Some(v) = env_parsed("TEMPO_VERBOSITY") {
            self.verbosity = v;
        }
        if let Some(v) = env_parsed("TEMPO_TRACE_PHASES") {
            self.trace_phases = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_ready_to_end_iterations == 0 {
            return Err(TempoError::InvalidConfig(
                "max_ready_to_end_iterations must be at least 1".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(TempoError::InvalidConfig("timeout_secs must be at least 1".into()));
        }
        if self.default_gate_capacity == 0 {
            return Err(TempoError::InvalidConfig(
                "default_gate_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn objection_drain(&self) -> Duration {
        Duration::from_secs(self.objection_drain_secs)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config:");
        tracing::info!("  ready_to_end: max_iterations={}", self.max_ready_to_end_iterations);
        tracing::info!("  timeout:      {}s (logical)", self.timeout_secs);
        tracing::info!("  verbosity:    {}", self.verbosity);
        tracing::info!("  trace:        {}", self.trace_phases);
    }
}
