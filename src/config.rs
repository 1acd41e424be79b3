//! Configuration management for employerfinder
//!
//! All configuration is loaded from `./config/employerfinder.toml` (or the
//! path given with `--config`). No hardcoded defaults exist in source code -
//! all defaults are in the config template.

use serde::Deserialize;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/employerfinder.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/employerfinder.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub names: NamesConfig,
    pub throttle: ThrottleConfig,
    pub rotation: RotationConfig,
    pub cooldown: CooldownConfig,
    pub burst: BurstConfig,
    pub retry: RetryConfig,
    pub checkpoint: CheckpointConfig,
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub rotator: RotatorConfig,
}

/// Locations of the durable state and lookup tables
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub work_list: PathBuf,
    pub results: PathBuf,
    pub ledger: PathBuf,
    pub state_table: PathBuf,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamesConfig {
    /// Longest name (in characters) the directory search form handles correctly
    pub max_search_chars: usize,
}

/// Fixed pacing between directory interactions
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    pub search_delay_ms: u64,
    pub post_case_delay_ms: u64,
}

impl ThrottleConfig {
    pub fn search_delay(&self) -> Duration {
        Duration::from_millis(self.search_delay_ms)
    }

    pub fn post_case_delay(&self) -> Duration {
        Duration::from_millis(self.post_case_delay_ms)
    }
}

/// Identity rotation cadence.
///
/// The countdown is reseeded from a normal distribution with the given mean
/// and standard deviation, floored and clamped to `min_countdown`.
#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    pub initial_countdown: i64,
    pub mean: f64,
    pub std_dev: f64,
    pub min_countdown: i64,
    /// Subtracted from the countdown on every transient directory failure
    pub failure_penalty: i64,
    pub settle_delay_ms: u64,
}

impl RotationConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    /// Pause after the directory explicitly blocks the caller
    pub hard_block_secs: u64,
}

impl CooldownConfig {
    pub fn hard_block(&self) -> Duration {
        Duration::from_secs(self.hard_block_secs)
    }
}

/// Failure-burst detection over a sliding time window
#[derive(Debug, Clone, Deserialize)]
pub struct BurstConfig {
    pub horizon_secs: u64,
    /// Number of failures inside the horizon that triggers a pause (0 disables)
    pub threshold: usize,
    pub pause_secs: u64,
}

impl BurstConfig {
    pub fn horizon(&self) -> Duration {
        Duration::from_secs(self.horizon_secs)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}

/// Backoff strategy between retry attempts
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
}

/// Bounded retry applied to every external call
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_strategy: BackoffStrategy,
    pub backoff_base_delay_ms: u64,
    pub backoff_max_delay_ms: u64,
}

impl RetryConfig {
    /// Delay before the retry that follows failed attempt number `attempt` (1-indexed).
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.backoff_base_delay_ms;
        let delay_ms = match self.backoff_strategy {
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
        };

        Duration::from_millis(delay_ms.min(self.backoff_max_delay_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// Number of changed cases between checkpoints
    pub interval: usize,
}

/// External directory search program and its exit-code contract
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub rate_limited_exit_code: i32,
    pub server_error_exit_code: i32,
    pub access_denied_exit_code: i32,
    pub not_ready_exit_code: i32,
}

/// External identity rotation program (optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RotatorConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse the embedded default template
    pub fn from_default_template() -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required_paths = [
            ("paths.work_list", &self.paths.work_list),
            ("paths.results", &self.paths.results),
            ("paths.ledger", &self.paths.ledger),
            ("paths.state_table", &self.paths.state_table),
        ];
        for (field, path) in required_paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyRequired { field: field.to_string() });
            }
        }

        if self.names.max_search_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "names.max_search_chars".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.rotation.min_countdown < 1 {
            return Err(ConfigError::InvalidValue {
                field: "rotation.min_countdown".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.rotation.std_dev.is_finite() && self.rotation.std_dev >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "rotation.std_dev".to_string(),
                reason: "must be a finite, non-negative number".to_string(),
            });
        }
        if !self.rotation.mean.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "rotation.mean".to_string(),
                reason: "must be a finite number".to_string(),
            });
        }

        if self.checkpoint.interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "checkpoint.interval".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.retry.backoff_max_delay_ms < self.retry.backoff_base_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.backoff_max_delay_ms".to_string(),
                reason: "must not be smaller than retry.backoff_base_delay_ms".to_string(),
            });
        }

        if self.directory.command.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "directory.command".to_string(),
            });
        }

        let exit_codes = [
            self.directory.rate_limited_exit_code,
            self.directory.server_error_exit_code,
            self.directory.access_denied_exit_code,
            self.directory.not_ready_exit_code,
        ];
        for (i, code) in exit_codes.iter().enumerate() {
            if *code == 0 || exit_codes[..i].contains(code) {
                return Err(ConfigError::InvalidValue {
                    field: "directory exit codes".to_string(),
                    reason: format!("{} is zero or used twice", code),
                });
            }
        }

        if let Some(command) = &self.rotator.command {
            if command.trim().is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: "rotator.command".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Create default configuration file at the given location
    pub fn create_default_config(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config(path)?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}
