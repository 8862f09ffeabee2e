//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "IDX_CONFIG";
/// Config file used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level application settings (`config/default.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Instrument tracked by this engine.
    #[serde(default = "default_instrument")]
    pub instrument: String,
    /// Strategy file; relative paths resolve against the config file's directory.
    #[serde(default = "default_strategy_path")]
    pub strategy_path: PathBuf,
    /// Periodic decision evaluation interval (ms). Default: 1,000.
    #[serde(default = "default_evaluation_interval_ms")]
    pub evaluation_interval_ms: u64,
    /// Outbound engine event channel capacity. Default: 1,024.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Inbound price/snapshot channel capacity. Default: 4,096.
    #[serde(default = "default_input_channel_capacity")]
    pub input_channel_capacity: usize,
    /// Strategy file poll interval for hot reload (ms); 0 disables. Default: 5,000.
    #[serde(default = "default_reload_poll_ms")]
    pub reload_poll_ms: u64,
    /// Open a managed position for every actionable entry decision.
    #[serde(default = "default_auto_open")]
    pub auto_open: bool,
    /// Directory the config was loaded from.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_instrument() -> String {
    "NIFTY".to_string()
}

fn default_strategy_path() -> PathBuf {
    PathBuf::from("strategy.toml")
}

fn default_evaluation_interval_ms() -> u64 {
    1_000
}

fn default_event_channel_capacity() -> usize {
    1_024
}

fn default_input_channel_capacity() -> usize {
    4_096
}

fn default_reload_poll_ms() -> u64 {
    5_000
}

fn default_auto_open() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instrument: default_instrument(),
            strategy_path: default_strategy_path(),
            evaluation_interval_ms: default_evaluation_interval_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            input_channel_capacity: default_input_channel_capacity(),
            reload_poll_ms: default_reload_poll_ms(),
            auto_open: default_auto_open(),
            base_dir: None,
        }
    }
}

impl AppConfig {
    /// Config path precedence: CLI argument > `IDX_CONFIG` > default.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load configuration from file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.instrument.trim().is_empty() {
            return Err(AppError::Config("instrument must not be empty".to_string()));
        }
        if self.evaluation_interval_ms == 0 {
            return Err(AppError::Config(
                "evaluation_interval_ms must be positive".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 || self.input_channel_capacity == 0 {
            return Err(AppError::Config(
                "channel capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Strategy file path, resolved against the config file's directory.
    pub fn strategy_file(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) if self.strategy_path.is_relative() => dir.join(&self.strategy_path),
            _ => self.strategy_path.clone(),
        }
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms)
    }

    /// `None` when hot reload is disabled.
    pub fn reload_poll_interval(&self) -> Option<Duration> {
        (self.reload_poll_ms > 0).then(|| Duration::from_millis(self.reload_poll_ms))
    }
}
