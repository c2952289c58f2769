//! BLE discovery sessions and the device registry they fill

mod adapter;
mod dispatcher;
pub mod events;
mod radio;
mod registry;
mod scanner_config;
mod session;
pub(crate) mod state;

pub use adapter::{failure_code_for, list_adapters, AdapterInfo, BtleplugRadio};

pub use dispatcher::{DispatchMessage, ScanCallback};
pub(crate) use dispatcher::ScanEventDispatcher;

pub use events::{
    receiver_to_stream, EventBroker, EventFilter, EventType, SessionEvent, StopReason, SubscriberId,
};

pub use radio::{failure_code, RadioCapabilities, RadioCapability, ScanRecord};

#[cfg(test)]
pub(crate) use radio::MockRadioCapability;

pub use registry::{Device, DeviceRegistry, DeviceView, UNKNOWN_DEVICE_LABEL};

pub use scanner_config::{ScanConfig, DEFAULT_SCAN_PERIOD};

pub use session::{ScanSession, ScanState, SessionId};
