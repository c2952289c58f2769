// Root module exports
pub mod bluetooth;
pub mod config;
pub mod error;
pub mod logging;
pub mod session_controller;

// Re-exports for convenience
pub use bluetooth::{
    BtleplugRadio, DeviceView, EventFilter, RadioCapability, ScanCallback, ScanConfig, SessionEvent, StopReason,
};
pub use config::{AppConfig, Configurable};
pub use error::{ControllerError, IndexError, RadioError, RecoveryAction};
pub use logging::configure_logging;
pub use session_controller::{ScanAffordances, SessionController};
