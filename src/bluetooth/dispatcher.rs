//! Serializes radio callbacks and expiry timers into registry/session mutations
//!
//! Radios and timers never touch shared state. They push a
//! [`DispatchMessage`] onto one queue, and a single dispatcher task applies
//! each message inside one critical section, publishing notifications in
//! the order messages were received.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::bluetooth::events::{EventBroker, SessionEvent, StopReason};
use crate::bluetooth::radio::{RadioCapability, ScanRecord};
use crate::bluetooth::session::SessionId;
use crate::bluetooth::state::{lock, ScanCore, SharedCore};
use crate::error::ErrorContext;

/// Work item for the dispatcher task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMessage {
    DeviceFound {
        session: SessionId,
        identifier: Option<String>,
        display_name: Option<String>,
    },
    Batch {
        session: SessionId,
        records: Vec<ScanRecord>,
    },
    Failure {
        session: SessionId,
        code: i32,
    },
    /// The session's scan period elapsed
    Expired { session: SessionId },
}

/// Handle a radio uses to report results for one session
///
/// Cheap to clone and safe to call from any thread. Calls made after the
/// controller is gone are dropped.
#[derive(Clone)]
pub struct ScanCallback {
    session: SessionId,
    queue: UnboundedSender<DispatchMessage>,
}

impl fmt::Debug for ScanCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCallback")
            .field("session", &self.session)
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

impl ScanCallback {
    pub(crate) fn new(session: SessionId, queue: UnboundedSender<DispatchMessage>) -> Self {
        Self { session, queue }
    }

    /// Session these results belong to
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// An advertisement was received
    ///
    /// A missing identifier marks a malformed result; it is dropped downstream.
    pub fn on_device_found(&self, identifier: Option<String>, display_name: Option<String>) {
        self.send(DispatchMessage::DeviceFound {
            session: self.session,
            identifier,
            display_name,
        });
    }

    /// Batched results; the radio also delivers each one through `on_device_found`
    pub fn on_batch(&self, records: Vec<ScanRecord>) {
        self.send(DispatchMessage::Batch {
            session: self.session,
            records,
        });
    }

    /// The radio reported an asynchronous scan failure
    pub fn on_failure(&self, code: i32) {
        self.send(DispatchMessage::Failure {
            session: self.session,
            code,
        });
    }

    fn send(&self, message: DispatchMessage) {
        if self.queue.send(message).is_err() {
            trace!("[ScanCallback session={}] Dispatcher gone, result dropped", self.session);
        }
    }
}

/// Applies dispatch messages to the shared core
pub struct ScanEventDispatcher {
    core: SharedCore,
    radio: Arc<dyn RadioCapability>,
    broker: EventBroker,
}

impl ScanEventDispatcher {
    pub(crate) fn new(core: SharedCore, radio: Arc<dyn RadioCapability>, broker: EventBroker) -> Self {
        Self { core, radio, broker }
    }

    /// Drain the queue on the given runtime until every sender is gone
    pub(crate) fn spawn(self, mut queue: UnboundedReceiver<DispatchMessage>, runtime: &Handle) -> JoinHandle<()> {
        runtime.spawn(async move {
            while let Some(message) = queue.recv().await {
                self.handle(message);
            }
            debug!("[ScanEventDispatcher::run] Queue closed, dispatcher exiting");
        })
    }

    /// Apply a single message atomically
    pub(crate) fn handle(&self, message: DispatchMessage) {
        let mut core = lock(&self.core);
        match message {
            DispatchMessage::DeviceFound {
                session,
                identifier,
                display_name,
            } => self.on_device_found(&mut core, session, identifier, display_name),
            DispatchMessage::Batch { session, records } => {
                debug!(
                    "[ScanEventDispatcher::on_batch session={}] Batch of {} results",
                    session,
                    records.len()
                );
            }
            DispatchMessage::Failure { session, code } => self.on_failure(&mut core, session, code),
            DispatchMessage::Expired { session } => self.on_expired(&mut core, session),
        }
    }

    fn on_device_found(
        &self,
        core: &mut ScanCore,
        session: SessionId,
        identifier: Option<String>,
        display_name: Option<String>,
    ) {
        let ctx = ErrorContext::new("ScanEventDispatcher", "on_device_found")
            .with_metadata("session", session.to_string());

        let identifier = match identifier {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!("{}Dropping result without an identifier", ctx);
                return;
            }
        };

        if !core.accepts_results_from(session) {
            debug!("{}Dropping late result for {}", ctx, identifier);
            return;
        }

        if core.registry.add(&identifier, display_name.as_deref()) {
            debug!("{}Added new device: {} ({:?})", ctx, identifier, display_name);
            self.broker.publish(SessionEvent::RegistryChanged {
                count: core.registry.count(),
            });
        }
    }

    fn on_failure(&self, core: &mut ScanCore, session: SessionId, code: i32) {
        let ctx = ErrorContext::new("ScanEventDispatcher", "on_failure")
            .with_metadata("session", session.to_string())
            .with_metadata("code", code.to_string());

        if !core.accepts_results_from(session) {
            debug!("{}Failure from inactive session ignored", ctx);
            return;
        }

        warn!("{}Discovery failed", ctx);
        self.broker.publish(SessionEvent::RadioFailure { session, code });

        if core.config.stop_on_radio_failure {
            if let Some(current) = core.session_mut(session) {
                if current.stop(self.radio.as_ref()) {
                    info!("{}Session stopped after radio failure", ctx);
                    self.broker.publish(SessionEvent::ScanStopped {
                        session,
                        reason: StopReason::RadioFailure,
                    });
                }
            }
        }
    }

    fn on_expired(&self, core: &mut ScanCore, session: SessionId) {
        let stopped = core
            .session_mut(session)
            .map_or(false, |current| current.expire(self.radio.as_ref()));

        if stopped {
            self.broker.publish(SessionEvent::ScanStopped {
                session,
                reason: StopReason::Expired,
            });
        } else {
            debug!("[ScanEventDispatcher::on_expired session={}] Stale expiry dropped", session);
        }
    }
}
