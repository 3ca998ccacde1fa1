use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::{Session, SessionId};
use crate::services::{Clock, ServiceError, SystemClock};

/// Persists the per-client [`Session`] bag between requests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, ServiceError>;
    async fn save(&self, id: &SessionId, session: &Session, ttl: Duration)
        -> Result<(), ServiceError>;
    async fn delete(&self, id: &SessionId) -> Result<(), ServiceError>;
    async fn health_check(&self) -> Result<(), ServiceError>;
}

pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, (Session, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, ServiceError> {
        let now = self.clock.now();
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| anyhow::anyhow!("Session store mutex poisoned: {}", e))?;
        match sessions.get(id) {
            Some((_, expires)) if *expires <= now => {
                sessions.remove(id);
                Ok(None)
            }
            Some((session, _)) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        id: &SessionId,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), ServiceError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| anyhow::anyhow!("Session ttl out of range: {}", e))?;
        let expires = self.clock.now() + ttl;
        self.sessions
            .lock()
            .map_err(|e| anyhow::anyhow!("Session store mutex poisoned: {}", e))?
            .insert(id.clone(), (session.clone(), expires));
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), ServiceError> {
        self.sessions
            .lock()
            .map_err(|e| anyhow::anyhow!("Session store mutex poisoned: {}", e))?
            .remove(id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
