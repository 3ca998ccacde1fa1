use chrono::Duration as TtlDuration;
use rand::RngCore;
use service_core::utils::signature::constant_time_eq;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Identity, RememberBlob, RememberToken, REMEMBER_PURPOSE};
use crate::services::{bounded, Clock, CredentialStore, KeyedLocks, ServiceError};

/// Issues, validates and revokes remember-me credentials.
///
/// The client keeps an HMAC-tagged blob naming the identity and a random
/// secret; the store keeps the secret's fingerprint and its issue time.
/// Operations on the same identity are serialized.
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
    signing_key: Arc<Vec<u8>>,
    ttl: TtlDuration,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    store_timeout: Duration,
}

impl CredentialVault {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        signing_key: impl Into<Vec<u8>>,
        ttl: TtlDuration,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            signing_key: Arc::new(signing_key.into()),
            ttl,
            clock,
            locks: KeyedLocks::new(),
            store_timeout,
        }
    }

    pub fn ttl(&self) -> TtlDuration {
        self.ttl
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Mint a fresh secret for `identity`, replacing any previous one.
    pub async fn issue(&self, identity: &Identity) -> Result<RememberBlob, ServiceError> {
        if identity.is_anonymous() {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "cannot issue a remember token without a logged in member"
            )));
        }

        let secret = generate_secret();
        let blob = RememberBlob::encode(identity, &secret, &self.signing_key)?;

        let guard = self.locks.lock(identity.as_str()).await;
        let token = RememberToken::new(identity.clone(), &secret, self.clock.now());
        let stored = bounded(self.store_timeout, "credential", self.store.put(&token)).await;
        drop(guard);
        self.locks.prune();
        stored?;

        tracing::debug!(identity = %identity, "Remember token issued");
        Ok(blob)
    }

    /// Resolve a client blob back to the identity it was issued for.
    ///
    /// Does not extend the token lifetime.
    pub async fn validate(&self, raw: &str) -> Result<Identity, ServiceError> {
        let (identity, secret) = RememberBlob::decode(raw, &self.signing_key)?;

        let guard = self.locks.lock(identity.as_str()).await;
        let result = self.check_stored(&identity, &secret).await;
        drop(guard);
        self.locks.prune();
        result.map(|()| identity)
    }

    async fn check_stored(&self, identity: &Identity, secret: &str) -> Result<(), ServiceError> {
        let lookup = bounded(
            self.store_timeout,
            "credential",
            self.store.get(identity, REMEMBER_PURPOSE),
        )
        .await;
        let stored = match lookup {
            Ok(Some(stored)) => stored,
            Ok(None) => return Err(ServiceError::Invalid),
            Err(ServiceError::Corrupt(detail)) => {
                // Unreadable entries are dropped so the member can log in again
                tracing::warn!(identity = %identity, detail = %detail, "Discarding corrupt remember entry");
                bounded(
                    self.store_timeout,
                    "credential",
                    self.store.delete(identity, REMEMBER_PURPOSE),
                )
                .await?;
                return Err(ServiceError::Invalid);
            }
            Err(e) => return Err(e),
        };

        let presented = RememberToken::hash_secret(secret);
        if !constant_time_eq(presented.as_bytes(), stored.secret_hash.as_bytes()) {
            tracing::warn!(identity = %identity, "Remember token secret mismatch");
            return Err(ServiceError::Invalid);
        }
        if stored.is_expired_at(self.clock.now(), self.ttl) {
            tracing::debug!(identity = %identity, "Remember token expired");
            return Err(ServiceError::Invalid);
        }
        Ok(())
    }

    /// Delete the stored secret. Missing entries are not an error.
    pub async fn revoke(&self, identity: &Identity) -> Result<(), ServiceError> {
        if identity.is_anonymous() {
            return Ok(());
        }
        let guard = self.locks.lock(identity.as_str()).await;
        bounded(
            self.store_timeout,
            "credential",
            self.store.delete(identity, REMEMBER_PURPOSE),
        )
        .await?;
        drop(guard);
        self.locks.prune();

        tracing::debug!(identity = %identity, "Remember token revoked");
        Ok(())
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
