//! Configuration management (TOML)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Floor for the monitoring window; shorter runs produce too few samples to
/// average meaningfully.
pub const MIN_DURATION_SECONDS: u64 = 10;
/// Floor for the sampling cadence; CPU deltas need a little time to settle.
pub const MIN_INTERVAL_SECONDS: f64 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub actions: ActionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub duration_seconds: u64,
    pub interval_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub backup_dir: PathBuf,
}

impl MonitorConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds.max(MIN_DURATION_SECONDS))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_seconds.max(MIN_INTERVAL_SECONDS))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            monitor: MonitorConfig {
                duration_seconds: 120,
                interval_seconds: 1.0,
            },
            actions: ActionConfig {
                backup_dir: default_backup_dir(),
            },
        }
    }
}

fn default_backup_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join("StartupTracker_Backups"))
        .unwrap_or_else(|| PathBuf::from("StartupTracker_Backups"))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "startup-tracker")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
