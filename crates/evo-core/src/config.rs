//! Configuration management for evo
//!
//! Repository-level settings for storage, population policy, the confidence
//! heuristic, ledger query defaults and the HTTP boundary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{EvoError, Result};

/// Engine configuration
///
/// Loaded from `.evo/config.toml` under the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvoConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub population: PopulationConfig,

    #[serde(default)]
    pub confidence: ConfidenceConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub agents: AgentPolicyConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Where the document store lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file, relative paths resolve against the project root
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

/// Agent population limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Maximum Tier-2 agents per application
    #[serde(default = "default_tier2_cap")]
    pub tier2_cap: usize,

    /// Example file paths kept per learned pattern
    #[serde(default = "default_max_examples")]
    pub max_examples_per_pattern: usize,
}

/// Confidence heuristic coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Base confidence for an agent with no reported outcomes
    #[serde(default = "default_base")]
    pub default_base: f64,

    /// How many outcomes' worth of weight `default_base` carries against the
    /// agent's own accepted/rejected history
    #[serde(default = "default_prior_weight")]
    pub prior_weight: f64,

    /// Prior observations needed before the recognition bonus applies
    #[serde(default = "default_recognition_min_frequency")]
    pub recognition_min_frequency: u64,

    /// Bonus weight applied to the pattern's own confidence
    #[serde(default = "default_recognition_weight")]
    pub recognition_weight: f64,

    /// Pattern confidence gained per observation
    #[serde(default = "default_pattern_step")]
    pub pattern_step: f64,
}

/// Ledger query defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,

    #[serde(default = "default_suggestion_limit")]
    pub default_suggestion_limit: usize,

    /// Only this many of the newest unapplied suggestions are ranked (0 = all)
    #[serde(default = "default_suggestion_window")]
    pub suggestion_window: usize,
}

/// Per-agent failure handling and update contention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPolicyConfig {
    /// Consecutive failures before an agent moves to `error` (0 disables)
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Optimistic-concurrency attempts per agent update
    #[serde(default = "default_max_update_retries")]
    pub max_update_retries: u32,
}

/// HTTP boundary settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// Default value providers
fn default_database_path() -> PathBuf {
    PathBuf::from(".evo/evo.db")
}

fn default_tier2_cap() -> usize {
    3
}

fn default_max_examples() -> usize {
    5
}

fn default_base() -> f64 {
    0.5
}

fn default_prior_weight() -> f64 {
    2.0
}

fn default_recognition_min_frequency() -> u64 {
    1
}

fn default_recognition_weight() -> f64 {
    0.25
}

fn default_pattern_step() -> f64 {
    0.1
}

fn default_history_limit() -> usize {
    20
}

fn default_suggestion_limit() -> usize {
    10
}

fn default_suggestion_window() -> usize {
    100
}

fn default_error_threshold() -> u32 {
    3
}

fn default_max_update_retries() -> u32 {
    8
}

fn default_bind() -> String {
    "127.0.0.1:7171".to_string()
}

impl EvoConfig {
    /// Load configuration from `.evo/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".evo/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| EvoError::Config(format!("Failed to parse config file: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.evo/config.toml`
    pub fn write_default(root: &Path) -> Result<()> {
        let config_dir = root.join(".evo");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| EvoError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Database path resolved against `root`
    pub fn database_path(&self, root: &Path) -> PathBuf {
        if self.storage.database_path.is_absolute() {
            self.storage.database_path.clone()
        } else {
            root.join(&self.storage.database_path)
        }
    }

    fn validate(&self) -> Result<()> {
        let c = &self.confidence;
        if !(0.0..=1.0).contains(&c.default_base) {
            return Err(EvoError::Config(
                "confidence.default_base must be within 0.0..=1.0".to_string(),
            ));
        }
        if c.recognition_weight < 0.0 || c.pattern_step <= 0.0 || c.prior_weight <= 0.0 {
            return Err(EvoError::Config(
                "confidence weights must be positive".to_string(),
            ));
        }
        if self.agents.max_update_retries == 0 {
            return Err(EvoError::Config(
                "agents.max_update_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EvoConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            population: PopulationConfig::default(),
            confidence: ConfidenceConfig::default(),
            ledger: LedgerConfig::default(),
            agents: AgentPolicyConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            tier2_cap: default_tier2_cap(),
            max_examples_per_pattern: default_max_examples(),
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            default_base: default_base(),
            prior_weight: default_prior_weight(),
            recognition_min_frequency: default_recognition_min_frequency(),
            recognition_weight: default_recognition_weight(),
            pattern_step: default_pattern_step(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_history_limit: default_history_limit(),
            default_suggestion_limit: default_suggestion_limit(),
            suggestion_window: default_suggestion_window(),
        }
    }
}

impl Default for AgentPolicyConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            max_update_retries: default_max_update_retries(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
