//! One discovery run: Idle -> Scanning -> Stopped

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::bluetooth::dispatcher::{DispatchMessage, ScanCallback};
use crate::bluetooth::radio::RadioCapability;
use crate::error::{ControllerError, ErrorContext};

/// Identifies a session; later sessions have larger ids
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Stopped,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A single time-boxed discovery attempt
pub struct ScanSession {
    id: SessionId,
    state: ScanState,
    scan_period: Duration,
    expiry_deadline: Option<Instant>,
    /// Pending one-shot expiry; `None` once disarmed
    expiry_task: Option<JoinHandle<()>>,
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("scan_period", &self.scan_period)
            .field("expiry_deadline", &self.expiry_deadline)
            .field("timer_armed", &self.expiry_task.is_some())
            .finish()
    }
}

impl ScanSession {
    pub fn new(id: SessionId, scan_period: Duration) -> Self {
        Self {
            id,
            state: ScanState::Idle,
            scan_period,
            expiry_deadline: None,
            expiry_task: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    /// When the running scan will stop by itself
    pub fn expiry_deadline(&self) -> Option<Instant> {
        self.expiry_deadline
    }

    pub fn is_timer_armed(&self) -> bool {
        self.expiry_task.is_some()
    }

    /// Ask the radio to start discovery and arm the expiry timer
    ///
    /// A rejected start leaves the state untouched.
    pub(crate) fn start(
        &mut self,
        radio: &dyn RadioCapability,
        queue: &UnboundedSender<DispatchMessage>,
        runtime: &Handle,
    ) -> Result<(), ControllerError> {
        let ctx = ErrorContext::new("ScanSession", "start").with_metadata("session", self.id.to_string());

        if self.is_scanning() {
            warn!("{}Session already scanning", ctx);
            return Err(ControllerError::AlreadyScanning);
        }

        if let Err(e) = radio.start_discovery(ScanCallback::new(self.id, queue.clone())) {
            warn!("{}Radio rejected start-discovery: {}", ctx, e);
            return Err(e.into());
        }

        let deadline = Instant::now() + self.scan_period;
        let expiry_queue = queue.clone();
        let id = self.id;
        self.expiry_task = Some(runtime.spawn(async move {
            sleep_until(deadline).await;
            // Receiver gone means the controller is gone too
            let _ = expiry_queue.send(DispatchMessage::Expired { session: id });
        }));
        self.expiry_deadline = Some(deadline);
        self.state = ScanState::Scanning;

        info!("{}Scanning for {:?}", ctx, self.scan_period);
        Ok(())
    }

    /// Stop a running scan; returns false (and does nothing) otherwise
    pub(crate) fn stop(&mut self, radio: &dyn RadioCapability) -> bool {
        if !self.is_scanning() {
            debug!("[ScanSession::stop session={}] Session is {}, nothing to stop", self.id, self.state);
            return false;
        }

        self.disarm();
        radio.stop_discovery();
        self.state = ScanState::Stopped;
        info!("[ScanSession::stop session={}] Scan stopped", self.id);
        true
    }

    /// Handle the expiry timer firing
    ///
    /// A timer that fires after `stop` has no effect.
    pub(crate) fn expire(&mut self, radio: &dyn RadioCapability) -> bool {
        if !self.is_scanning() {
            debug!("[ScanSession::expire session={}] Stale expiry dropped", self.id);
            return false;
        }
        if self.expiry_deadline.map_or(true, |deadline| Instant::now() < deadline) {
            debug!("[ScanSession::expire session={}] Expiry before deadline dropped", self.id);
            return false;
        }

        info!("[ScanSession::expire session={}] Scan period elapsed", self.id);
        self.stop(radio)
    }

    fn disarm(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.disarm();
    }
}
