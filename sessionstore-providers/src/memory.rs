//! In-process session storage
//!
//! Sessions live in a map owned by the provider; nothing survives a restart
//! and nothing is shared between processes.

use async_trait::async_trait;
use chrono::Utc;
use sessionstore_core::{Session, SessionError, SessionProvider, SessionRecord, SessionResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory session storage (default provider)
///
/// Stores a snapshot of each saved session, so later mutations of a handle
/// are invisible until it is saved again. Expired records stay readable until
/// [`SessionProvider::garbage_collect`] removes them.
#[derive(Clone)]
pub struct MemoryProvider {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored records, expired ones included
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for MemoryProvider {
    async fn read(&self, id: &str) -> SessionResult<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .map(Session::from)
            .ok_or_else(|| SessionError::not_found(id))
    }

    async fn save(&self, session: &Session) -> SessionResult<()> {
        let record = session.to_record();
        let mut sessions = self.sessions.write().await;
        sessions.insert(record.uuid.clone(), record);
        debug!("Saved session {} to memory storage", session.id());
        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(id).is_some() {
            debug!("Destroyed session {} in memory storage", id);
        }
        Ok(())
    }

    async fn garbage_collect(&self) -> SessionResult<u64> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.expire >= now);
        let removed = (before - sessions.len()) as u64;

        if removed > 0 {
            info!("Swept {} expired sessions from memory storage", removed);
        }
        Ok(removed)
    }
}
