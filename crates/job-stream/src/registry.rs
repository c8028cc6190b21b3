//! Process-wide table of live sessions, keyed by connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::session::{ConnectionId, Session};

/// Registry operations that indicate a lifecycle bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("connection {0} already has a session")]
    AlreadyRegistered(ConnectionId),
    #[error("connection {0} has no session")]
    NotRegistered(ConnectionId),
}

/// Live connection -> session mapping.
///
/// Holds the only long-lived strong reference to each [`Session`]. Built once
/// at startup and shared through [`AppState`](crate::state::AppState).
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: DashMap<ConnectionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: DashMap::new(),
        }
    }

    /// Allocate an identity for a newly accepted connection.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a session. An existing entry for the same connection is left
    /// untouched and reported as an error.
    pub fn register(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let connection_id = session.connection_id();
        match self.sessions.entry(connection_id) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(connection_id)),
            Entry::Vacant(slot) => {
                slot.insert(session);
                debug!(connection_id = %connection_id, "session registered");
                Ok(())
            }
        }
    }

    pub fn lookup(&self, connection_id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.get(&connection_id).map(|s| Arc::clone(s.value()))
    }

    /// Remove a session and close it. The close runs while the entry is still
    /// locked, so no lookup can observe an open session that is on its way
    /// out.
    pub fn unregister(&self, connection_id: ConnectionId) -> Result<Arc<Session>, RegistryError> {
        self.sessions
            .remove_if(&connection_id, |_, session| {
                session.close();
                true
            })
            .map(|(_, session)| {
                debug!(connection_id = %connection_id, "session unregistered");
                session
            })
            .ok_or(RegistryError::NotRegistered(connection_id))
    }

    /// Close every live session, returning how many were still open. Entries
    /// stay until each connection's own teardown unregisters them.
    pub fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        sessions.iter().filter(|s| s.close()).count()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.sessions.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
