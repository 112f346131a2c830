//! Session persistence.
//!
//! [`SessionStore`] is the seam between request handling and wherever session
//! records live. The server ships with [`MemorySessionStore`]; sessions are
//! owned by the process and do not survive a restart.

use async_trait::async_trait;
use sdr_app_core::{Result, SessionId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SessionStoreError;
use crate::session::Session;

/// Storage backend for session records.
///
/// Writes are whole-record replacements; concurrent writers for the same
/// session ID resolve as last writer wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a session by ID. Expired records are reported as absent.
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError>;

    /// Inserts or replaces a session.
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError>;

    /// Deletes a session. Deleting an unknown ID is not an error.
    async fn delete(&self, id: &SessionId) -> Result<(), SessionStoreError>;

    /// Deletes expired sessions and returns how many were removed.
    async fn delete_expired(&self) -> Result<u64, SessionStoreError>;
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|session| !session.is_expired())
            .cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        if self.sessions.write().await.remove(id).is_some() {
            debug!(session_id = %id, "session deleted");
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}
