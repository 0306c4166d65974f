//! TOML configuration.
//!
//! Loaded at startup (created with defaults on first run) and reloadable at
//! runtime; the `[display]` section is handed to the scheduler as a hot
//! replacement without restarting the daemon.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::errors::{DaemonError, DaemonResult};
use crate::notification::Urgency;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub log_level: String,
    pub log_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            log_level: "info".to_string(),
            log_path: None,
        }
    }
}

/// Presentation policy consumed by the scheduler. Replaceable at runtime;
/// a `max_visible` change affects future admission only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Upper bound on simultaneously visible notifications.
    pub max_visible: usize,
    /// Coalesce duplicate notifications into one slot with a counter.
    pub stacking: bool,
    pub timeouts_ms: TimeoutTable,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            max_visible: 3,
            stacking: true,
            timeouts_ms: TimeoutTable::default(),
        }
    }
}

/// Per-urgency display durations in milliseconds; 0 means never expire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutTable {
    pub low: u64,
    pub normal: u64,
    pub critical: u64,
}

impl Default for TimeoutTable {
    fn default() -> Self {
        TimeoutTable {
            low: 5_000,
            normal: 10_000,
            critical: 0,
        }
    }
}

impl DisplayConfig {
    /// Default display duration for an urgency level; `None` means never.
    pub fn timeout_for(&self, urgency: Urgency) -> Option<Duration> {
        let ms = match urgency {
            Urgency::Low => self.timeouts_ms.low,
            Urgency::Normal => self.timeouts_ms.normal,
            Urgency::Critical => self.timeouts_ms.critical,
        };
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    pub fn new(config_path: Option<PathBuf>) -> DaemonResult<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };
        let config = Self::load_or_create(&config_path)?;

        Ok(ConfigManager {
            config_path,
            config,
        })
    }

    fn default_config_path() -> DaemonResult<PathBuf> {
        let base_dirs =
            BaseDirs::new().ok_or_else(|| DaemonError::config("failed to get base directories"))?;
        let dir = base_dirs.config_dir().join("toastd");
        fs::create_dir_all(&dir)
            .map_err(|e| DaemonError::io_with_source(&dir, "create config directory", e))?;
        Ok(dir.join("config.toml"))
    }

    fn load_or_create(path: &Path) -> DaemonResult<Config> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| DaemonError::io_with_source(path, "read config file", e))?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Config::default();
            let content = toml::to_string_pretty(&config)
                .map_err(|e| DaemonError::config_with_source("serialize default config", e))?;
            fs::write(path, content)
                .map_err(|e| DaemonError::io_with_source(path, "write default config", e))?;
            Ok(config)
        }
    }

    pub fn save(&self) -> DaemonResult<()> {
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| DaemonError::config_with_source("serialize config", e))?;
        fs::write(&self.config_path, content)
            .map_err(|e| DaemonError::io_with_source(&self.config_path, "write config file", e))?;
        Ok(())
    }

    pub fn reload(&mut self) -> DaemonResult<()> {
        self.config = Self::load_or_create(&self.config_path)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
