use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{Identity, RememberToken};
use crate::services::ServiceError;

/// Server-side storage for long-lived credentials keyed by `(identity, purpose)`.
///
/// `put` replaces any previous entry for the same key in one write.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn put(&self, token: &RememberToken) -> Result<(), ServiceError>;
    async fn get(
        &self,
        identity: &Identity,
        purpose: &str,
    ) -> Result<Option<RememberToken>, ServiceError>;
    async fn delete(&self, identity: &Identity, purpose: &str) -> Result<(), ServiceError>;
    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: Mutex<HashMap<(Identity, String), RememberToken>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(&self, token: &RememberToken) -> Result<(), ServiceError> {
        self.tokens
            .lock()
            .map_err(|e| anyhow::anyhow!("Credential store mutex poisoned: {}", e))?
            .insert(
                (token.identity.clone(), token.purpose.clone()),
                token.clone(),
            );
        Ok(())
    }

    async fn get(
        &self,
        identity: &Identity,
        purpose: &str,
    ) -> Result<Option<RememberToken>, ServiceError> {
        let token = self
            .tokens
            .lock()
            .map_err(|e| anyhow::anyhow!("Credential store mutex poisoned: {}", e))?
            .get(&(identity.clone(), purpose.to_string()))
            .cloned();
        Ok(token)
    }

    async fn delete(&self, identity: &Identity, purpose: &str) -> Result<(), ServiceError> {
        self.tokens
            .lock()
            .map_err(|e| anyhow::anyhow!("Credential store mutex poisoned: {}", e))?
            .remove(&(identity.clone(), purpose.to_string()));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
