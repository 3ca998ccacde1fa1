use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::services::{Clock, ServiceError, SystemClock};

/// Records single-use values (anti-forgery nonces) until they expire.
#[async_trait]
pub trait NonceCache: Send + Sync {
    /// Mark `nonce` as used. Returns `false` when it was already claimed.
    async fn claim(&self, nonce: &str, expiry_seconds: i64) -> Result<bool, ServiceError>;
}

pub struct MemoryNonceCache {
    used: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryNonceCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryNonceCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            used: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl NonceCache for MemoryNonceCache {
    async fn claim(&self, nonce: &str, expiry_seconds: i64) -> Result<bool, ServiceError> {
        let now = self.clock.now();
        let mut used = self
            .used
            .lock()
            .map_err(|e| anyhow::anyhow!("Nonce cache mutex poisoned: {}", e))?;
        used.retain(|_, expires| *expires > now);

        if used.contains_key(nonce) {
            return Ok(false);
        }
        used.insert(
            nonce.to_string(),
            now + chrono::Duration::seconds(expiry_seconds.max(1)),
        );
        Ok(true)
    }
}
