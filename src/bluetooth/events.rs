//! Session notifications and their distribution to subscribers

use std::sync::{Arc, Mutex};

use futures::Stream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::bluetooth::registry::DeviceView;
use crate::bluetooth::session::SessionId;
use crate::bluetooth::state::lock;

/// Why a session left the Scanning state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The consumer called stop
    Requested,
    /// The scan period elapsed
    Expired,
    /// A device was selected, which ends discovery
    DeviceSelected,
    /// The consumer became inactive
    Deactivated,
    /// A new session replaced this one
    Restarted,
    /// The radio reported a failure and the config asks to stop on failure
    RadioFailure,
    /// The controller was dropped mid-scan
    Shutdown,
}

/// Type of session event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ScanStarted,
    ScanStopped,
    RegistryChanged,
    RegistryCleared,
    RadioFailure,
    DeviceSelected,
}

/// Notification published by the session core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Discovery is running
    ScanStarted { session: SessionId },
    /// Discovery ended
    ScanStopped { session: SessionId, reason: StopReason },
    /// A device was added; `count` is the new registry size
    RegistryChanged { count: usize },
    /// The registry was emptied
    RegistryCleared,
    /// The radio reported an asynchronous failure
    RadioFailure { session: SessionId, code: i32 },
    /// A device was handed off to the downstream consumer
    DeviceSelected(DeviceView),
}

impl SessionEvent {
    /// Get the type of this event
    pub fn get_type(&self) -> EventType {
        match self {
            Self::ScanStarted { .. } => EventType::ScanStarted,
            Self::ScanStopped { .. } => EventType::ScanStopped,
            Self::RegistryChanged { .. } => EventType::RegistryChanged,
            Self::RegistryCleared => EventType::RegistryCleared,
            Self::RadioFailure { .. } => EventType::RadioFailure,
            Self::DeviceSelected(_) => EventType::DeviceSelected,
        }
    }
}

/// Defines which events a subscriber is interested in
pub enum EventFilter {
    /// Accept all events
    All,
    /// Only specific event types
    EventTypes(Vec<EventType>),
    /// Custom filter function
    Custom(Box<dyn Fn(&SessionEvent) -> bool + Send + Sync + 'static>),
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "EventFilter::All"),
            Self::EventTypes(types) => write!(f, "EventFilter::EventTypes({:?})", types),
            Self::Custom(_) => write!(f, "EventFilter::Custom(<function>)"),
        }
    }
}

impl EventFilter {
    pub fn all() -> Self {
        Self::All
    }

    pub fn event_types(types: Vec<EventType>) -> Self {
        Self::EventTypes(types)
    }

    pub fn custom<F>(filter_fn: F) -> Self
    where
        F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Box::new(filter_fn))
    }

    /// What a list view needs to know to re-query the registry
    pub fn registry_only() -> Self {
        Self::event_types(vec![EventType::RegistryChanged, EventType::RegistryCleared])
    }

    /// Scan start/stop, for toggling scan affordances
    pub fn scan_state_only() -> Self {
        Self::event_types(vec![EventType::ScanStarted, EventType::ScanStopped])
    }

    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            Self::All => true,
            Self::EventTypes(types) => types.contains(&event.get_type()),
            Self::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Subscriber ID type
pub type SubscriberId = u32;

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<SessionEvent>,
    filter: EventFilter,
}

#[derive(Default)]
struct BrokerInner {
    next_subscriber_id: SubscriberId,
    subscribers: Vec<Subscriber>,
}

/// Fans session events out to subscribers
///
/// Delivery is synchronous and unbounded: every subscriber sees every
/// matching event, in publish order. Clones share one subscriber list.
#[derive(Clone, Default)]
pub struct EventBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events with a filter
    pub fn subscribe(&self, filter: EventFilter) -> (SubscriberId, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = unbounded_channel();
        let mut inner = lock(&self.inner);
        inner.next_subscriber_id += 1;
        let id = inner.next_subscriber_id;
        inner.subscribers.push(Subscriber {
            id,
            sender: tx,
            filter,
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        lock(&self.inner).subscribers.retain(|s| s.id != id);
    }

    /// Replace a subscriber's filter; false if the subscriber is unknown
    pub fn modify_filter(&self, id: SubscriberId, filter: EventFilter) -> bool {
        let mut inner = lock(&self.inner);
        match inner.subscribers.iter_mut().find(|s| s.id == id) {
            Some(subscriber) => {
                subscriber.filter = filter;
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every matching subscriber
    ///
    /// Subscribers whose receiver was dropped are removed.
    pub fn publish(&self, event: SessionEvent) {
        let mut inner = lock(&self.inner);
        inner.subscribers.retain(|subscriber| {
            if !subscriber.filter.matches(&event) {
                return !subscriber.sender.is_closed();
            }
            subscriber.sender.send(event.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    /// Drop every subscriber, closing their channels
    pub fn shutdown(&self) {
        lock(&self.inner).subscribers.clear();
    }
}

/// Wrap a subscription as a `Stream`
pub fn receiver_to_stream(rx: UnboundedReceiver<SessionEvent>) -> impl Stream<Item = SessionEvent> {
    UnboundedReceiverStream::new(rx)
}
