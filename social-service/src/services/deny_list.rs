use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::models::Identity;
use crate::services::ServiceError;

/// Members refused login regardless of valid credentials.
#[async_trait]
pub trait DenyList: Send + Sync {
    async fn is_denied(&self, identity: &Identity) -> Result<bool, ServiceError>;
}

#[derive(Default)]
pub struct MemoryDenyList {
    denied: Mutex<HashSet<Identity>>,
}

impl MemoryDenyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, identity: Identity) -> Result<(), ServiceError> {
        self.denied
            .lock()
            .map_err(|e| anyhow::anyhow!("Deny list mutex poisoned: {}", e))?
            .insert(identity);
        Ok(())
    }

    pub fn allow(&self, identity: &Identity) -> Result<(), ServiceError> {
        self.denied
            .lock()
            .map_err(|e| anyhow::anyhow!("Deny list mutex poisoned: {}", e))?
            .remove(identity);
        Ok(())
    }
}

#[async_trait]
impl DenyList for MemoryDenyList {
    async fn is_denied(&self, identity: &Identity) -> Result<bool, ServiceError> {
        let denied = self
            .denied
            .lock()
            .map_err(|e| anyhow::anyhow!("Deny list mutex poisoned: {}", e))?
            .contains(identity);
        Ok(denied)
    }
}
