use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::time::Duration;

use crate::models::{Identity, RememberToken, Session, SessionId};
use crate::services::{CredentialStore, NonceCache, ServiceError, SessionStore};

/// Redis-backed remember secrets, sessions and consumed anti-forgery nonces.
#[derive(Clone)]
pub struct RedisService {
    _client: Client,
    manager: ConnectionManager,
    /// Redis-side expiry for remember entries; validity is still decided by
    /// the vault from `updated_at`.
    credential_retention_seconds: u64,
}

impl RedisService {
    pub async fn new(
        config: &crate::config::RedisConfig,
        credential_retention_seconds: u64,
    ) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects on its own
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
            credential_retention_seconds: credential_retention_seconds.max(1),
        })
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn credential_key(identity: &Identity, purpose: &str) -> String {
        format!("credential:{}:{}", purpose, identity.as_str())
    }

    fn session_key(id: &SessionId) -> String {
        format!("session:{}", id.as_str())
    }
}

fn decode<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T, ServiceError> {
    serde_json::from_str(raw)
        .map_err(|e| ServiceError::Corrupt(format!("{} entry: {}", what, e)))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))
}

#[async_trait]
impl CredentialStore for RedisService {
    async fn put(&self, token: &RememberToken) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(Self::credential_key(&token.identity, &token.purpose))
            .arg(encode(token)?)
            .arg("EX")
            .arg(self.credential_retention_seconds)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        identity: &Identity,
        purpose: &str,
    ) -> Result<Option<RememberToken>, ServiceError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::credential_key(identity, purpose))
            .query_async(&mut conn)
            .await?;
        raw.map(|raw| decode(&raw, "credential")).transpose()
    }

    async fn delete(&self, identity: &Identity, purpose: &str) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(Self::credential_key(identity, purpose))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.ping().await
    }
}

#[async_trait]
impl SessionStore for RedisService {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, ServiceError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::session_key(id))
            .query_async(&mut conn)
            .await?;
        raw.map(|raw| decode(&raw, "session")).transpose()
    }

    async fn save(
        &self,
        id: &SessionId,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(Self::session_key(id))
            .arg(encode(session)?)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(Self::session_key(id))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.ping().await
    }
}

#[async_trait]
impl NonceCache for RedisService {
    async fn claim(&self, nonce: &str, expiry_seconds: i64) -> Result<bool, ServiceError> {
        let mut conn = self.manager.clone();
        // SET NX replies nil when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(format!("nonce:{}", nonce))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(expiry_seconds.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}
