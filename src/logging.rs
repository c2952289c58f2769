//! Structured logging for lescan
//!
//! Installs a `log::Log` implementation with timestamps, optional file output
//! and per-category gating of debug records.

use chrono::Local;
use log::Level;
use log::{LevelFilter, Metadata, Record};
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::{Once, RwLock};

use crate::config::{LogLevel, LoggingSettings};
use crate::error::{ErrorContext, RecoveryAction};

/// Timestamp format for log entries
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Global initialization guard
static INIT_LOGGER: Once = Once::new();

/// Debug flag categories for selective logging
#[derive(Debug, Clone, Default)]
pub struct DebugFlags {
    pub scan: bool,     // Session lifecycle, dispatcher, controller
    pub registry: bool, // Device registry mutations
    pub radio: bool,    // btleplug adapter and radio callbacks
    pub config: bool,   // Settings loading and saving
    pub all: bool,      // Enable all debug output
}

/// Global debug flags storage
static DEBUG_FLAGS: RwLock<DebugFlags> = RwLock::new(DebugFlags {
    scan: false,
    registry: false,
    radio: false,
    config: false,
    all: false,
});

/// Logger installed by `configure_logging`
pub struct LescanLogger {
    /// File output for logs
    file: Option<Mutex<File>>,
    /// Log level filter
    level: LevelFilter,
    /// Whether to output to stderr
    console_output: bool,
}

impl log::Log for LescanLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.level() > self.level {
            return false;
        }

        // Debug records also need their category enabled
        if metadata.level() == Level::Debug {
            return should_log_debug(metadata.target());
        }

        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now().format(TIMESTAMP_FORMAT);

        let level_str = match record.level() {
            Level::Error => "\x1B[31mERROR\x1B[0m", // Red
            Level::Warn => "\x1B[33mWARN \x1B[0m",  // Yellow
            Level::Info => "\x1B[32mINFO \x1B[0m",  // Green
            Level::Debug => "\x1B[36mDEBUG\x1B[0m", // Cyan
            Level::Trace => "\x1B[90mTRACE\x1B[0m", // Gray
        };
        let module = record.module_path().unwrap_or("<unknown>");

        if self.console_output {
            let console_entry = format!("[{}] {} [{}] {}\n", timestamp, level_str, module, record.args());
            let _ = io::stderr().write_all(console_entry.as_bytes());
        }

        if let Some(file) = &self.file {
            let file_entry = format!("[{}] {:<5} [{}] {}\n", timestamp, record.level(), module, record.args());
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(file_entry.as_bytes());
                let _ = file.flush();
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Configure logging with the specified level and optionally a log file
///
/// Only the first call in a process installs a logger; later calls return `Ok`.
pub fn configure_logging(level: LogLevel, log_file: Option<PathBuf>, console_output: bool) -> Result<(), String> {
    let mut result = Ok(());

    INIT_LOGGER.call_once(|| {
        let level_filter = level_filter(level);

        let file = if let Some(path) = log_file.clone() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        result = Err(format!("Failed to create log directory: {}", e));
                        return;
                    }
                }
            }

            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => Some(Mutex::new(file)),
                Err(e) => {
                    result = Err(format!("Failed to open log file: {}", e));
                    return;
                }
            }
        } else {
            None
        };

        let logger = Box::new(LescanLogger {
            file,
            level: level_filter,
            console_output,
        });

        if let Err(e) = log::set_boxed_logger(logger) {
            result = Err(format!("Failed to set logger: {}", e));
            return;
        }

        log::set_max_level(level_filter);

        log::info!("Logging initialized at level: {}", level);
        if let Some(path) = log_file {
            log::info!("Log file: {}", path.display());
        }
    });

    result
}

/// Configure logging from the `logging` section of the settings file
///
/// Debug level turns on every debug category.
pub fn init_from_settings(settings: &LoggingSettings) -> Result<(), String> {
    if matches!(settings.level, LogLevel::Debug | LogLevel::Trace) {
        set_debug_flags(DebugFlags {
            all: true,
            ..DebugFlags::default()
        });
    }
    configure_logging(settings.level, settings.file.clone(), settings.console)
}

/// Set global debug flags for selective logging
pub fn set_debug_flags(flags: DebugFlags) {
    if let Ok(mut debug_flags) = DEBUG_FLAGS.write() {
        *debug_flags = flags;
    }
}

/// Check if a debug category should log based on the module path and global flags
pub fn should_log_debug(module_path: &str) -> bool {
    if let Ok(flags) = DEBUG_FLAGS.read() {
        if flags.all {
            return true;
        }

        if module_path.contains("::registry") {
            return flags.registry;
        }
        if module_path.contains("::adapter") || module_path.contains("::radio") {
            return flags.radio;
        }
        if module_path.contains("::session") || module_path.contains("::dispatcher") {
            return flags.scan;
        }
        if module_path.contains("::config") {
            return flags.config;
        }
    }
    false
}

/// Log an error with context
pub fn log_error<E: Debug>(error: &E, context: &ErrorContext) {
    log::error!("{}Error: {:?}", context, error);
}

/// Log an error together with what the caller can do about it
pub fn log_error_with_recovery<E: Debug>(error: &E, context: &ErrorContext, recovery: RecoveryAction) {
    log_error(error, context);
    if recovery != RecoveryAction::None {
        log::info!("{}Recovery action: {}", context, recovery.description());
    }
}
