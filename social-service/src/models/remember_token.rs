use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use service_core::utils::signature::{generate_tag, sha256_hex, verify_tag};

use crate::{models::Identity, services::ServiceError};

/// Storage purpose under which remember-me secrets are kept.
pub const REMEMBER_PURPOSE: &str = "remember";

/// Server-side half of a remember-me credential.
///
/// Only the SHA-256 fingerprint of the secret is persisted; the secret itself
/// lives in the client blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RememberToken {
    pub identity: Identity,
    pub purpose: String,
    pub secret_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl RememberToken {
    pub fn new(identity: Identity, secret: &str, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            purpose: REMEMBER_PURPOSE.to_string(),
            secret_hash: Self::hash_secret(secret),
            updated_at: now,
        }
    }

    /// Hash a secret using SHA-256
    pub fn hash_secret(secret: &str) -> String {
        sha256_hex(secret.as_bytes())
    }

    /// Valid only while `now < updated_at + ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now >= self.updated_at + ttl
    }
}

/// Client-held remember-me blob: `base64url(identity|secret).hex(hmac)`.
///
/// The tag is keyed with a server secret, so a blob with an edited identity or
/// secret is rejected before any store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberBlob(String);

impl RememberBlob {
    pub fn encode(identity: &Identity, secret: &str, key: &[u8]) -> Result<Self, ServiceError> {
        let payload = URL_SAFE_NO_PAD.encode(format!("{}|{}", identity.as_str(), secret));
        let tag = generate_tag(key, payload.as_bytes())?;
        Ok(Self(format!("{}.{}", payload, tag)))
    }

    /// Check the tag and split the payload into `(identity, secret)`.
    pub fn decode(raw: &str, key: &[u8]) -> Result<(Identity, String), ServiceError> {
        let (payload, tag) = raw.split_once('.').ok_or(ServiceError::Invalid)?;
        if !verify_tag(key, payload.as_bytes(), tag)? {
            return Err(ServiceError::Invalid);
        }

        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| ServiceError::Invalid)?;
        let decoded = String::from_utf8(decoded).map_err(|_| ServiceError::Invalid)?;
        let (identity, secret) = decoded.split_once('|').ok_or(ServiceError::Invalid)?;
        if secret.is_empty() {
            return Err(ServiceError::Invalid);
        }
        let identity = Identity::parse(identity).map_err(|_| ServiceError::Invalid)?;

        Ok((identity, secret.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Long-lived cookie carrying the remember blob, named after the host so
/// several virtual hosts on one domain do not share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires: DateTime<Utc>,
    pub secure: bool,
    pub http_only: bool,
}

impl RememberCookie {
    pub fn cookie_name(host: &str) -> String {
        sha256_hex(host.to_ascii_lowercase().as_bytes())
    }

    pub fn issue(host: &str, blob: RememberBlob, expires: DateTime<Utc>) -> Self {
        Self {
            name: Self::cookie_name(host),
            value: blob.into_string(),
            path: "/".to_string(),
            expires,
            secure: true,
            http_only: true,
        }
    }

    /// Deletion cookie: empty value, expiry at the epoch.
    pub fn removal(host: &str) -> Self {
        Self {
            name: Self::cookie_name(host),
            value: String::new(),
            path: "/".to_string(),
            expires: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
            secure: true,
            http_only: true,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.value.is_empty()
    }
}
