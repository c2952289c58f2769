//! State shared by the controller and the dispatcher task

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bluetooth::registry::DeviceRegistry;
use crate::bluetooth::scanner_config::ScanConfig;
use crate::bluetooth::session::{ScanSession, SessionId};

/// Registry and session, always locked together
#[derive(Debug, Default)]
pub(crate) struct ScanCore {
    pub registry: DeviceRegistry,
    pub session: Option<ScanSession>,
    pub config: ScanConfig,
    next_session: SessionId,
}

impl ScanCore {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn next_session_id(&mut self) -> SessionId {
        self.next_session += 1;
        self.next_session
    }

    /// The current session, if it has the given id
    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut ScanSession> {
        self.session.as_mut().filter(|s| s.id() == id)
    }

    /// Whether events tagged with `id` may still mutate the registry
    pub fn accepts_results_from(&self, id: SessionId) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.id() == id && s.is_scanning())
    }

    pub fn is_scanning(&self) -> bool {
        self.session.as_ref().map_or(false, ScanSession::is_scanning)
    }
}

pub(crate) type SharedCore = Arc<Mutex<ScanCore>>;

/// Lock a mutex, carrying on with the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
