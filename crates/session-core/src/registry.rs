//! Registry of live sessions

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use rcs_message_core::ContactId;

use crate::errors::{Result, SessionError};
use crate::session::SessionHandle;
use crate::types::SessionId;

/// Counters kept by the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub active_sessions: usize,
    pub total_admitted: u64,
    pub total_removed: u64,
    /// Admissions refused because the registry was full
    pub total_rejected: u64,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, SessionHandle>,
    stats: RegistryStats,
}

/// Bounded set of live sessions
///
/// The registry owns the handles; sessions only keep a weak reference
/// back to it for removing themselves when they end.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

/// Weak reference held by a session task
#[derive(Clone)]
pub(crate) struct WeakSessionRegistry(Weak<RwLock<RegistryState>>);

impl WeakSessionRegistry {
    pub(crate) fn upgrade(&self) -> Option<SessionRegistry> {
        self.0.upgrade().map(|inner| SessionRegistry { inner })
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn downgrade(&self) -> WeakSessionRegistry {
        WeakSessionRegistry(Arc::downgrade(&self.inner))
    }

    /// Insert a session unless `max_sessions` are already live
    ///
    /// The check and the insertion happen under one lock. A zero limit
    /// means unlimited.
    pub async fn admit(&self, handle: SessionHandle, max_sessions: usize) -> Result<()> {
        let mut state = self.inner.write().await;
        if max_sessions > 0 && state.sessions.len() >= max_sessions {
            state.stats.total_rejected += 1;
            warn!(
                "Refusing session {}: {} sessions already live",
                handle.id(),
                state.sessions.len()
            );
            return Err(SessionError::CapacityExceeded { max: max_sessions });
        }
        let id = handle.id().clone();
        state.sessions.insert(id.clone(), handle);
        state.stats.total_admitted += 1;
        state.stats.active_sessions = state.sessions.len();
        debug!("Registered session: {}", id);
        Ok(())
    }

    /// Remove a session; removing an unknown id does nothing
    pub async fn unregister(&self, session_id: &SessionId) -> bool {
        let mut state = self.inner.write().await;
        let removed = state.sessions.remove(session_id).is_some();
        if removed {
            state.stats.total_removed += 1;
            state.stats.active_sessions = state.sessions.len();
            debug!("Unregistered session: {}", session_id);
        }
        removed
    }

    /// Record an invitation refused before any session was built
    pub async fn record_rejection(&self) {
        self.inner.write().await.stats.total_rejected += 1;
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.inner.read().await.sessions.get(session_id).cloned()
    }

    pub async fn list(&self) -> Vec<SessionHandle> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    /// Live sessions with `contact`
    pub async fn find_by_contact(&self, contact: &ContactId) -> Vec<SessionHandle> {
        self.inner
            .read()
            .await
            .sessions
            .values()
            .filter(|handle| &handle.info().remote == contact)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether another session would exceed `max_sessions`
    pub async fn is_full(&self, max_sessions: usize) -> bool {
        max_sessions > 0 && self.len().await >= max_sessions
    }

    pub async fn get_stats(&self) -> RegistryStats {
        self.inner.read().await.stats.clone()
    }
}
