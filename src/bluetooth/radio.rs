//! The seam between the session core and whatever radio stack does the scanning

use crate::bluetooth::dispatcher::ScanCallback;
use crate::error::RadioError;

/// Failure codes passed to [`ScanCallback::on_failure`]
pub mod failure_code {
    /// A scan with the same settings is already running
    pub const ALREADY_STARTED: i32 = 1;
    /// The scan could not be registered with the stack (often a permission problem)
    pub const REGISTRATION_FAILED: i32 = 2;
    /// Stack-internal error
    pub const INTERNAL_ERROR: i32 = 3;
    /// The adapter does not support the requested scan
    pub const FEATURE_UNSUPPORTED: i32 = 4;
    /// No hardware resources left to run the scan
    pub const OUT_OF_HARDWARE_RESOURCES: i32 = 5;
    /// The stack throttled the scan
    pub const SCANNING_TOO_FREQUENTLY: i32 = 6;
}

/// What a radio can do, checked before any session is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioCapabilities {
    /// Whether the host can scan for LE advertisements at all
    pub supports_scanning: bool,
    /// Adapter name or identifier
    pub name: String,
}

impl Default for RadioCapabilities {
    fn default() -> Self {
        Self {
            supports_scanning: true,
            name: String::new(),
        }
    }
}

/// One result inside a batch delivery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRecord {
    pub identifier: Option<String>,
    pub display_name: Option<String>,
}

impl ScanRecord {
    pub fn new(identifier: impl Into<String>, display_name: Option<&str>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            display_name: display_name.map(str::to_string),
        }
    }
}

/// A short-range radio that can run a discovery scan
///
/// Both calls are requests: they must not wait for the radio to act.
/// Results go to the supplied [`ScanCallback`], from any thread; the
/// implementation must never call back into the session controller from
/// inside `start_discovery` or `stop_discovery`.
#[cfg_attr(test, mockall::automock)]
pub trait RadioCapability: Send + Sync {
    fn capabilities(&self) -> RadioCapabilities;

    /// Begin listening for advertisements
    fn start_discovery(&self, callback: ScanCallback) -> Result<(), RadioError>;

    /// Stop the running scan
    fn stop_discovery(&self);
}
