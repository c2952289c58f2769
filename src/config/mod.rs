//! Settings management

mod app_config;

pub use app_config::{default_settings_path, AppConfig, LogLevel, LoggingSettings, ScanSettings};

/// Trait for configurable components
pub trait Configurable {
    /// Apply configuration
    fn apply_config(&mut self, config: &AppConfig);
}
