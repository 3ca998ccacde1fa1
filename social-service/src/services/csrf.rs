use rand::RngCore;
use service_core::utils::signature::{generate_tag, verify_tag};
use std::sync::Arc;
use std::time::Duration;

use crate::models::SessionId;
use crate::services::{bounded, Clock, NonceCache, ServiceError};

/// Tolerated clock drift for tokens stamped slightly in the future.
const MAX_FUTURE_SKEW_SECONDS: i64 = 60;

/// Anti-forgery tokens bound to a session.
///
/// A token is `nonce.timestamp.tag` where the tag is an HMAC over the session
/// id, the nonce and the timestamp. Each token is accepted once.
#[derive(Clone)]
pub struct ForgeryGuard {
    secret: Arc<Vec<u8>>,
    ttl_seconds: i64,
    nonces: Arc<dyn NonceCache>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl ForgeryGuard {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        ttl_seconds: i64,
        nonces: Arc<dyn NonceCache>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            ttl_seconds,
            nonces,
            clock,
            store_timeout,
        }
    }

    pub fn issue(&self, session_id: &SessionId) -> Result<String, ServiceError> {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);
        let timestamp = self.clock.now().timestamp();

        let tag = generate_tag(&self.secret, payload(session_id, &nonce, timestamp).as_bytes())?;
        Ok(format!("{}.{}.{}", nonce, timestamp, tag))
    }

    /// Accept `token` for `session_id` and burn it. Any mismatch, expiry or
    /// replay is `Forbidden`.
    pub async fn validate(&self, session_id: &SessionId, token: &str) -> Result<(), ServiceError> {
        let mut parts = token.splitn(3, '.');
        let (Some(nonce), Some(timestamp), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ServiceError::Forbidden);
        };
        if nonce.is_empty() || !nonce.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ServiceError::Forbidden);
        }
        let timestamp: i64 = timestamp.parse().map_err(|_| ServiceError::Forbidden)?;

        let signed = payload(session_id, nonce, timestamp);
        if !verify_tag(&self.secret, signed.as_bytes(), tag)? {
            tracing::warn!("Anti-forgery token signature mismatch");
            return Err(ServiceError::Forbidden);
        }

        let now = self.clock.now().timestamp();
        if timestamp > now + MAX_FUTURE_SKEW_SECONDS || now - timestamp >= self.ttl_seconds {
            tracing::debug!(age_seconds = now - timestamp, "Anti-forgery token expired");
            return Err(ServiceError::Forbidden);
        }

        let claim = self.nonces.claim(nonce, self.ttl_seconds);
        if !bounded(self.store_timeout, "nonce", claim).await? {
            tracing::warn!("Anti-forgery token replayed");
            return Err(ServiceError::Forbidden);
        }
        Ok(())
    }
}

fn payload(session_id: &SessionId, nonce: &str, timestamp: i64) -> String {
    format!("{}|{}|{}", session_id.as_str(), nonce, timestamp)
}
