//! Outward-facing API for a presentation layer
//!
//! The controller owns the shared registry/session core, the dispatcher task
//! that feeds it, and the event broker consumers subscribe to. Every method
//! is a short critical section on the core; none of them wait on the radio.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::bluetooth::state::{lock, ScanCore, SharedCore};
use crate::bluetooth::{
    DeviceView, DispatchMessage, EventBroker, EventFilter, RadioCapability, ScanConfig, ScanEventDispatcher,
    ScanSession, ScanState, SessionEvent, StopReason, SubscriberId,
};
use crate::config::{AppConfig, Configurable};
use crate::error::{ControllerError, ErrorContext, IndexError};

/// Which scan controls a menu should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanAffordances {
    pub show_scan: bool,
    pub show_stop: bool,
    pub show_progress: bool,
}

impl ScanAffordances {
    fn for_scanning(scanning: bool) -> Self {
        Self {
            show_scan: !scanning,
            show_stop: scanning,
            show_progress: scanning,
        }
    }
}

/// Drives discovery sessions for one consumer
pub struct SessionController {
    core: SharedCore,
    radio: Arc<dyn RadioCapability>,
    broker: EventBroker,
    queue: UnboundedSender<DispatchMessage>,
    runtime: Handle,
    dispatch_task: JoinHandle<()>,
}

impl SessionController {
    /// Create a controller on the current Tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(radio: Arc<dyn RadioCapability>, config: ScanConfig) -> Self {
        Self::with_runtime(Handle::current(), radio, config)
    }

    /// Create a controller whose timers and dispatcher run on `runtime`
    pub fn with_runtime(runtime: Handle, radio: Arc<dyn RadioCapability>, config: ScanConfig) -> Self {
        let core = Arc::new(Mutex::new(ScanCore::new(config)));
        let broker = EventBroker::new();
        let (queue, queue_rx) = unbounded_channel();

        let dispatch_task =
            ScanEventDispatcher::new(core.clone(), radio.clone(), broker.clone()).spawn(queue_rx, &runtime);

        Self {
            core,
            radio,
            broker,
            queue,
            runtime,
            dispatch_task,
        }
    }

    fn core(&self) -> MutexGuard<'_, ScanCore> {
        lock(&self.core)
    }

    /// Start a fresh session, replacing any running one
    pub fn start(&self) -> Result<(), ControllerError> {
        let ctx = ErrorContext::new("SessionController", "start");

        let capabilities = self.radio.capabilities();
        if !capabilities.supports_scanning {
            error!("{}Radio '{}' cannot scan", ctx, capabilities.name);
            return Err(ControllerError::UnsupportedHardware);
        }

        let mut core = self.core();
        self.stop_current(&mut core, StopReason::Restarted);

        core.registry.clear();
        self.broker.publish(SessionEvent::RegistryCleared);

        let id = core.next_session_id();
        let mut session = ScanSession::new(id, core.config.scan_period);
        let result = session.start(self.radio.as_ref(), &self.queue, &self.runtime);
        core.session = Some(session);

        match result {
            Ok(()) => {
                info!("{}Session {} started", ctx, id);
                self.broker.publish(SessionEvent::ScanStarted { session: id });
                Ok(())
            }
            Err(e) => {
                warn!("{}Session {} failed to start: {}", ctx, id, e);
                Err(e)
            }
        }
    }

    /// Stop the running session; does nothing when not scanning
    pub fn stop(&self) {
        let mut core = self.core();
        self.stop_current(&mut core, StopReason::Requested);
    }

    fn stop_current(&self, core: &mut ScanCore, reason: StopReason) -> bool {
        let Some(session) = core.session.as_mut() else {
            return false;
        };
        let id = session.id();
        if !session.stop(self.radio.as_ref()) {
            return false;
        }
        debug!("[SessionController::stop] Session {} stopped ({:?})", id, reason);
        self.broker.publish(SessionEvent::ScanStopped { session: id, reason });
        true
    }

    pub fn is_scanning(&self) -> bool {
        self.core().is_scanning()
    }

    /// State of the current session; Idle before the first start
    pub fn scan_state(&self) -> ScanState {
        self.core()
            .session
            .as_ref()
            .map_or(ScanState::Idle, ScanSession::state)
    }

    pub fn affordances(&self) -> ScanAffordances {
        ScanAffordances::for_scanning(self.is_scanning())
    }

    pub fn device_count(&self) -> usize {
        self.core().registry.count()
    }

    pub fn device_at(&self, index: usize) -> Result<DeviceView, IndexError> {
        self.core().registry.get(index).map(|d| d.view())
    }

    pub fn device_by_id(&self, identifier: &str) -> Option<DeviceView> {
        self.core().registry.find(identifier).map(|d| d.view())
    }

    /// Every registered device, in discovery order
    pub fn devices(&self) -> Vec<DeviceView> {
        self.core().registry.views()
    }

    /// Hand a listed device to the downstream consumer
    ///
    /// A valid selection ends discovery before the view is returned. An
    /// invalid index fails without touching the session.
    pub fn select_device(&self, index: usize) -> Result<DeviceView, ControllerError> {
        let ctx = ErrorContext::new("SessionController", "select_device").with_metadata("index", index.to_string());

        let mut core = self.core();
        let view = core.registry.get(index).map(|d| d.view()).map_err(|e| {
            warn!("{}{}", ctx, e);
            ControllerError::from(e)
        })?;

        self.stop_current(&mut core, StopReason::DeviceSelected);
        info!("{}Selected {} ({})", ctx, view.identifier, view.label());
        self.broker.publish(SessionEvent::DeviceSelected(view.clone()));
        Ok(view)
    }

    /// The consumer came to the foreground
    pub fn on_activate(&self) -> Result<(), ControllerError> {
        debug!("[SessionController::on_activate] Activated");
        self.start()
    }

    /// The consumer went to the background; discovered devices are discarded
    pub fn on_deactivate(&self) {
        debug!("[SessionController::on_deactivate] Deactivated");
        let mut core = self.core();
        self.stop_current(&mut core, StopReason::Deactivated);
        core.registry.clear();
        self.broker.publish(SessionEvent::RegistryCleared);
    }

    /// Subscribe to session events with a filter
    pub fn subscribe(&self, filter: EventFilter) -> (SubscriberId, UnboundedReceiver<SessionEvent>) {
        self.broker.subscribe(filter)
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> UnboundedReceiver<SessionEvent> {
        self.broker.subscribe(EventFilter::All).1
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.broker.unsubscribe(id);
    }

    pub fn config(&self) -> ScanConfig {
        self.core().config.clone()
    }

    /// Replace the scan configuration; takes effect from the next session
    pub fn set_config(&self, config: ScanConfig) {
        self.core().config = config;
    }
}

impl Configurable for SessionController {
    fn apply_config(&mut self, config: &AppConfig) {
        self.set_config(config.to_scan_config());
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let mut core = lock(&self.core);
        self.stop_current(&mut core, StopReason::Shutdown);
        drop(core);
        self.dispatch_task.abort();
        self.broker.shutdown();
    }
}
