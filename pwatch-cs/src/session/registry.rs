//! Live session registry
//!
//! Keyed by session id. Holds only what is needed to route cancellation and to
//! report on live sessions; pipeline state never passes through here.

use super::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How the session's client is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Ndjson,
    EventStream,
    Socket { connection_id: Uuid },
}

#[derive(Debug)]
struct SessionEntry {
    token: CancellationToken,
    state: SessionState,
    transport: Transport,
    started_at: DateTime<Utc>,
}

/// Read-only view of a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: SessionState,
    pub transport: Transport,
    pub started_at: DateTime<Utc>,
}

/// Shared table of live sessions
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the map consistent, so a poisoned lock
    // is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, SessionEntry>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, SessionEntry>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new Idle session
    ///
    /// The session token is a child of `parent`, so cancelling a connection
    /// cancels every session it owns.
    pub fn open(&self, transport: Transport, parent: &CancellationToken) -> (Uuid, CancellationToken) {
        let id = Uuid::new_v4();
        let token = parent.child_token();
        self.write().insert(
            id,
            SessionEntry {
                token: token.clone(),
                state: SessionState::Idle,
                transport,
                started_at: Utc::now(),
            },
        );
        (id, token)
    }

    /// Cancel one session; false if it is not live
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.read().get(&id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every session on a socket connection, returning how many
    pub fn cancel_connection(&self, connection_id: Uuid) -> usize {
        let sessions = self.read();
        let mut cancelled = 0;
        for entry in sessions.values() {
            if entry.transport == (Transport::Socket { connection_id }) {
                entry.token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn set_state(&self, id: Uuid, state: SessionState) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.state = state;
        }
    }

    pub fn state(&self, id: Uuid) -> Option<SessionState> {
        self.read().get(&id).map(|entry| entry.state)
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.write().remove(&id).is_some()
    }

    /// Live sessions, oldest first
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .read()
            .iter()
            .map(|(id, entry)| SessionSnapshot {
                session_id: *id,
                state: entry.state,
                transport: entry.transport,
                started_at: entry.started_at,
            })
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
