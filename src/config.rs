use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::model::{Quantity, QUANTITY_COUNT};
use crate::{Error, Result};

/// Process configuration. Loaded once at startup, validated, then
/// immutable for the life of the run. Every field has a default, so a
/// config file only needs to name what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sample_interval_secs: u64,
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub thresholds: Thresholds,
    pub weighter: WeighterConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

/// Base dead-band thresholds, one per quantity. Power thresholds are in
/// watts, the battery level threshold is a ratio.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    pub grid_power: f64,
    pub battery_power: f64,
    pub pv_power: f64,
    pub load_power: f64,
    pub battery_level: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeighterConfig {
    pub start_secs: u64,
    pub factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval_secs: 5,
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
            thresholds: Thresholds::default(),
            weighter: WeighterConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8000, timeout_secs: 10 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("heliostat-data") }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            grid_power: 50.0,
            battery_power: 50.0,
            pv_power: 50.0,
            load_power: 50.0,
            battery_level: 0.5e-2,
        }
    }
}

impl Default for WeighterConfig {
    fn default() -> Self {
        Self { start_secs: 300, factor: 2.0 }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8001 }
    }
}

impl Config {
    /// Defaults, overlaid with the JSON config file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let bytes = fs::read(path)
                    .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
                serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sample_interval_secs == 0 {
            return Err(Error::Config("sample_interval_secs must be positive".into()));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(Error::Config("gateway.timeout_secs must be positive".into()));
        }
        if self.weighter.start_secs == 0 {
            return Err(Error::Config("weighter.start_secs must be positive".into()));
        }
        if self.weighter.factor <= 1.0 {
            return Err(Error::Config(format!(
                "weighter.factor must be > 1, got {}",
                self.weighter.factor
            )));
        }
        for (q, threshold) in Quantity::ALL.iter().zip(self.thresholds.as_array()) {
            if threshold <= 0.0 {
                return Err(Error::Config(format!(
                    "threshold for {} must be positive, got {}",
                    q, threshold
                )));
            }
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Thresholds {
    /// Thresholds indexed by quantity ordinal.
    pub fn as_array(&self) -> [f64; QUANTITY_COUNT] {
        [
            self.grid_power,
            self.battery_power,
            self.pv_power,
            self.load_power,
            self.battery_level,
        ]
    }
}

impl WeighterConfig {
    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start_secs)
    }
}
