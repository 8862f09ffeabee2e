//! Strategy configuration and its atomically swapped store.
//!
//! A `StrategyConfig` is an immutable value: filters, categories, scenarios
//! and risk profiles loaded together. Reloads build a new value, validate it
//! and swap the pointer, so an in-flight evaluation always sees one
//! consistent version.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use idx_core::{Direction, RiskProfile};
use idx_risk::RiskGateConfig;
use idx_scoring::DirectionConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DecisionError, DecisionResult};

/// Complete, versioned strategy configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub risk_gate: RiskGateConfig,
    #[serde(default)]
    pub long: DirectionConfig,
    #[serde(default)]
    pub short: DirectionConfig,
    #[serde(default)]
    pub risk_profiles: BTreeMap<String, RiskProfile>,
}

impl StrategyConfig {
    pub fn from_toml_str(content: &str) -> DecisionResult<Self> {
        toml::from_str(content)
            .map_err(|e| DecisionError::Config(format!("Failed to parse strategy: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> DecisionResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DecisionError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn direction(&self, direction: Direction) -> &DirectionConfig {
        match direction {
            Direction::Long => &self.long,
            Direction::Short => &self.short,
        }
    }

    pub fn profile(&self, name: &str) -> Option<&RiskProfile> {
        self.risk_profiles.get(name)
    }

    /// Every structural check; fatal at load time.
    pub fn validate(&self) -> DecisionResult<()> {
        self.risk_gate.validate()?;

        for (name, profile) in &self.risk_profiles {
            profile.validate().map_err(|source| DecisionError::Profile {
                profile: name.clone(),
                source,
            })?;
        }

        for direction in Direction::ALL {
            let config = self.direction(direction);
            config.validate()?;
            for scenario in &config.scenarios {
                if !self.risk_profiles.contains_key(&scenario.risk_profile) {
                    return Err(DecisionError::Config(format!(
                        "{direction} scenario {} references unknown risk profile {}",
                        scenario.name, scenario.risk_profile
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Holder of the active configuration.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<StrategyConfig>>,
}

impl ConfigStore {
    /// Create a store; the initial configuration must be valid.
    pub fn new(config: StrategyConfig) -> DecisionResult<Self> {
        config.validate()?;
        info!(version = config.version, "Strategy configuration loaded");
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Snapshot of the active configuration.
    pub fn current(&self) -> Arc<StrategyConfig> {
        Arc::clone(&self.current.read())
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Validate and atomically install a new configuration.
    ///
    /// On error the active configuration is unchanged. A version that does
    /// not move forward is bumped past the active one.
    pub fn install(&self, mut config: StrategyConfig) -> DecisionResult<u64> {
        config.validate()?;

        let mut current = self.current.write();
        if config.version <= current.version {
            debug!(
                requested = config.version,
                active = current.version,
                "Strategy version not increasing, bumping"
            );
            config.version = current.version + 1;
        }
        let version = config.version;
        *current = Arc::new(config);
        drop(current);

        info!(version, "Strategy configuration installed");
        Ok(version)
    }
}
