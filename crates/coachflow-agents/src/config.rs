//! Runtime configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists. The extractor API key is read from the environment only.

use coachflow_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub engine: EngineConfig,
    pub checkpoints: CheckpointConfig,
    pub extractor: ExtractorConfig,
}

/// Loop and step limits for every graph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node executions allowed per run of one graph.
    pub max_steps: usize,
    /// Edit rounds before a draft must be confirmed or discarded.
    pub max_edit_rounds: usize,
    /// Clarifying questions allowed when a filter matches zero or several items.
    pub max_disambiguation_rounds: usize,
    /// Infeasible schedules tolerated before the request fails.
    pub max_generation_attempts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    /// Directory for the file backend.
    pub dir: PathBuf,
    /// Suspended runs older than this are dropped.
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub model: String,
    pub max_tokens: u32,
    pub base_url: Option<String>,
}

// ============================================================
// Defaults
// ============================================================

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 256,
            max_edit_rounds: 8,
            max_disambiguation_rounds: 3,
            max_generation_attempts: 3,
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            dir: PathBuf::from(".coachflow/checkpoints"),
            ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model: coachflow_llm::anthropic::DEFAULT_MODEL.into(),
            max_tokens: 1024,
            base_url: None,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl CoachConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn api_key() -> Option<String> {
        std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())
    }
}

impl CheckpointConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = CoachConfig::parse(
            r#"
            [engine]
            max_edit_rounds = 2

            [checkpoints]
            backend = "file"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_edit_rounds, 2);
        assert_eq!(config.engine.max_steps, 256);
        assert_eq!(config.checkpoints.backend, CheckpointBackend::File);
        assert_eq!(config.checkpoints.ttl(), Duration::from_secs(604_800));
    }

    #[test]
    fn dump_parses_back() {
        let text = CoachConfig::default().to_toml();
        let config = CoachConfig::parse(&text).unwrap();
        assert_eq!(config.engine.max_disambiguation_rounds, 3);
        assert_eq!(config.extractor.model, coachflow_llm::anthropic::DEFAULT_MODEL);
        assert!(text.contains("[extractor]"));
    }

    #[test]
    fn bad_file_is_a_config_error() {
        assert!(matches!(
            CoachConfig::parse("engine = 5"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = CoachConfig::load(Path::new("/nonexistent/coachflow.toml"));
        assert_eq!(config.checkpoints.backend, CheckpointBackend::Memory);
    }
}
