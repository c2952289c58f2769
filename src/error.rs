//! Error types for lescan
//!
//! Radio-level failures, controller failures surfaced to the consumer, and
//! the context/recovery helpers used when logging them.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Errors reported by a radio capability when asked to start discovery
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    /// The capability exists but cannot be used right now (adapter off, stack gone)
    #[error("Radio unavailable: {0}")]
    Unavailable(String),

    /// Authorization was revoked between checks and the call
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Selection of a registry position that does not exist
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("Device index {index} out of range (registry holds {len})")]
    OutOfRange { index: usize, len: usize },
}

/// Errors returned by the session controller and scan sessions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControllerError {
    /// The host has no usable scanning radio at all
    #[error("Bluetooth LE scanning is not supported on this host")]
    UnsupportedHardware,

    /// Start-discovery was rejected by the capability
    #[error("Cannot start discovery: {0}")]
    RadioUnavailable(#[from] RadioError),

    /// A session that is already scanning was asked to start again
    #[error("Scan already in progress")]
    AlreadyScanning,

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl ControllerError {
    /// What the caller can do about this error
    pub fn recovery(&self) -> RecoveryAction {
        match self {
            Self::UnsupportedHardware => RecoveryAction::None,
            Self::RadioUnavailable(RadioError::PermissionDenied(_)) => {
                RecoveryAction::GrantPermission
            }
            Self::RadioUnavailable(_) => RecoveryAction::EnableRadio,
            Self::AlreadyScanning => RecoveryAction::StopScan,
            Self::Index(_) => RecoveryAction::RefreshList,
        }
    }

    /// Whether retrying the same call can succeed after remediation
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::UnsupportedHardware)
    }
}

/// Errors while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Suggested remediation for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing the user can do on this host
    None,
    /// Turn the Bluetooth radio back on, then retry
    EnableRadio,
    /// Re-grant Bluetooth permissions, then retry
    GrantPermission,
    /// Stop the running scan first
    StopScan,
    /// Re-query the device list before selecting again
    RefreshList,
}

impl RecoveryAction {
    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "No recovery possible",
            Self::EnableRadio => "Enable Bluetooth and retry",
            Self::GrantPermission => "Grant Bluetooth permission and retry",
            Self::StopScan => "Stop the current scan",
            Self::RefreshList => "Refresh the device list",
        }
    }
}

/// Where an operation happened, for log prefixes
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a key/value pair
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}::{}", self.component, self.operation)?;
        if !self.metadata.is_empty() {
            let mut pairs: Vec<_> = self.metadata.iter().collect();
            pairs.sort();
            for (key, value) in pairs {
                write!(f, " {}={}", key, value)?;
            }
        }
        write!(f, "] ")
    }
}
