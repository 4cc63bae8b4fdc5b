//! TOML-based application configuration.
//!
//! Stores the tunables the engine reads at startup: the base time
//! multiplier, the medication peak window, the default check-in cadence,
//! and the machine schedule granularity.
//!
//! Configuration is stored at `~/.config/momentum/config.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CoreError};
use crate::storage::data_dir;

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/momentum/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Starting point for the dynamic multiplier.
    #[serde(default = "default_base_multiplier")]
    pub base_multiplier: f64,
    /// Peak window as (start, end) hours after medication.
    #[serde(default = "default_peak_window")]
    pub peak_window_hours: (i64, i64),
    /// Check-in cadence used when the caller doesn't pick one.
    #[serde(default = "default_checkin_interval")]
    pub default_checkin_interval_min: u32,
    /// Wall-clock seconds per scheduled machine "minute". 60 is real time;
    /// smaller values compress schedules for demos and tests.
    #[serde(default = "default_tick_secs")]
    pub machine_tick_secs: u64,
}

fn default_base_multiplier() -> f64 {
    1.5
}
fn default_peak_window() -> (i64, i64) {
    (1, 5)
}
fn default_checkin_interval() -> u32 {
    10
}
fn default_tick_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_multiplier: default_base_multiplier(),
            peak_window_hours: default_peak_window(),
            default_checkin_interval_min: default_checkin_interval(),
            machine_tick_secs: default_tick_secs(),
        }
    }
}

impl Config {
    /// Path to the configuration file.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn config_path() -> Result<PathBuf, CoreError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when the file
    /// doesn't exist yet.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, CoreError> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let config = toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Ok(config)
    }

    /// Save the configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<(), CoreError> {
        let path = Self::config_path()?;
        let raw = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Machine schedule granularity as a [`Duration`].
    pub fn machine_tick(&self) -> Duration {
        Duration::from_secs(self.machine_tick_secs.max(1))
    }
}
