use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::bluetooth::{ScanConfig, DEFAULT_SCAN_PERIOD};
use crate::error::{ConfigError, ErrorContext};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Discovery session settings
    pub scan: ScanSettings,

    /// Logger settings
    pub logging: LoggingSettings,
}

/// Discovery session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Scan budget per session, in milliseconds
    pub scan_period_ms: u64,

    /// End the session when the radio reports a mid-scan failure
    pub stop_on_radio_failure: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scan_period_ms: DEFAULT_SCAN_PERIOD.as_millis() as u64,
            stop_on_radio_failure: false,
        }
    }
}

/// Logger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,

    /// Append log records to this file as well
    pub file: Option<PathBuf>,

    /// Write log records to stderr
    pub console: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            console: true,
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        write!(f, "{}", name)
    }
}

impl AppConfig {
    /// Convert to scan config for discovery sessions
    pub fn to_scan_config(&self) -> ScanConfig {
        ScanConfig::new()
            .with_scan_period(Duration::from_millis(self.scan.scan_period_ms))
            .with_stop_on_radio_failure(self.scan.stop_on_radio_failure)
    }

    /// Load configuration from the default location
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = default_settings_path();
        if !path.exists() {
            debug!("[AppConfig::load] No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    /// Load configuration from a JSON file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let ctx = ErrorContext::new("AppConfig", "load_from_path").with_metadata("path", path.display().to_string());

        let contents = fs::read_to_string(path).map_err(|e| {
            warn!("{}Failed to read settings: {}", ctx, e);
            ConfigError::from(e)
        })?;
        let config = serde_json::from_str(&contents).map_err(|e| {
            warn!("{}Failed to parse settings: {}", ctx, e);
            ConfigError::from(e)
        })?;

        info!("{}Settings loaded", ctx);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_path(&default_settings_path())
    }

    /// Save configuration as pretty-printed JSON, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        debug!("[AppConfig::save_to_path] Settings written to {}", path.display());
        Ok(())
    }
}

/// Get the default settings path
pub fn default_settings_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|config_dir| config_dir.join("lescan").join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("settings.json"))
}
