//! Recording fake radio for headless session tests

use std::sync::{Arc, Mutex, MutexGuard};

use lescan::bluetooth::{RadioCapabilities, RadioCapability, ScanCallback, SessionEvent};
use lescan::RadioError;
use tokio::sync::mpsc::UnboundedReceiver;

/// A call the session core made on the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCall {
    Start,
    Stop,
}

#[derive(Default)]
struct RadioLog {
    calls: Vec<RadioCall>,
    callbacks: Vec<ScanCallback>,
    fail_next_start: Option<RadioError>,
    found_on_start: Vec<(String, String)>,
}

/// Radio that records every request and hands out the callbacks it was given
pub struct RecordingRadio {
    capabilities: RadioCapabilities,
    log: Mutex<RadioLog>,
}

impl RecordingRadio {
    pub fn new() -> Arc<Self> {
        init_test_logging();
        Arc::new(Self {
            capabilities: RadioCapabilities {
                supports_scanning: true,
                name: "recording radio".to_string(),
            },
            log: Mutex::new(RadioLog::default()),
        })
    }

    /// A host without a scanning radio
    pub fn unsupported() -> Arc<Self> {
        init_test_logging();
        Arc::new(Self {
            capabilities: RadioCapabilities {
                supports_scanning: false,
                name: "no radio".to_string(),
            },
            log: Mutex::new(RadioLog::default()),
        })
    }

    fn log(&self) -> MutexGuard<'_, RadioLog> {
        self.log.lock().unwrap()
    }

    /// Reject the next start-discovery with `err`
    pub fn fail_next_start(&self, err: RadioError) {
        self.log().fail_next_start = Some(err);
    }

    /// Report this device synchronously from inside every start-discovery
    pub fn report_on_start(&self, identifier: &str, name: &str) {
        self.log().found_on_start.push((identifier.to_string(), name.to_string()));
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.log().calls.clone()
    }

    pub fn starts(&self) -> usize {
        self.calls().iter().filter(|c| **c == RadioCall::Start).count()
    }

    pub fn stops(&self) -> usize {
        self.calls().iter().filter(|c| **c == RadioCall::Stop).count()
    }

    /// Callback handed to the most recent accepted start
    pub fn callback(&self) -> ScanCallback {
        self.log().callbacks.last().cloned().expect("discovery was never started")
    }

    /// Report a device through the most recent callback
    pub fn found(&self, identifier: &str, name: &str) {
        self.callback()
            .on_device_found(Some(identifier.to_string()), Some(name.to_string()));
    }
}

impl RadioCapability for RecordingRadio {
    fn capabilities(&self) -> RadioCapabilities {
        self.capabilities.clone()
    }

    fn start_discovery(&self, callback: ScanCallback) -> Result<(), RadioError> {
        let mut log = self.log();
        if let Some(err) = log.fail_next_start.take() {
            return Err(err);
        }
        log.calls.push(RadioCall::Start);
        for (identifier, name) in &log.found_on_start {
            callback.on_device_found(Some(identifier.clone()), Some(name.clone()));
        }
        log.callbacks.push(callback);
        Ok(())
    }

    fn stop_discovery(&self) {
        self.log().calls.push(RadioCall::Stop);
    }
}

/// Let the dispatcher task drain its queue
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Every event received so far, without waiting
pub fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
