//! Test helpers for social-service integration tests.
//!
//! Everything runs on the in-memory stores with a manual clock, so no
//! PostgreSQL or Redis is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use chrono::Utc;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use social_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, RateLimitConfig, RedisConfig, SecurityConfig, SessionConfig,
        SocialConfig,
    },
    models::{Identity, Member},
    services::{
        AdapterRegistry, Clock, CredentialVault, ForgeryGuard, ManualClock, MemoryCredentialStore,
        MemoryDenyList, MemoryMemberDirectory, MemoryNonceCache, MemoryRelationshipStore,
        MemorySessionStore, PasswordAuthAdapter, RelationshipService, SessionAuthenticator,
    },
    utils::{hash_password, Password},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_HOST: &str = "social.test";
pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn test_config() -> SocialConfig {
    SocialConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "social-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/social_test".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        session: SessionConfig {
            remember_ttl_days: 30,
            session_ttl_seconds: 3600,
            store_timeout_ms: 500,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            remember_signing_key: "remember-signing-key-for-integration-tests".to_string(),
            csrf_secret: "csrf-secret-for-integration-tests-0123456".to_string(),
            csrf_token_ttl_seconds: 600,
            secure_cookies: true,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
        },
    }
}

/// Application wired to in-memory stores, with handles kept for assertions.
pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<MemoryMemberDirectory>,
    pub deny_list: Arc<MemoryDenyList>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub relationship_store: Arc<MemoryRelationshipStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_relationship_store(Arc::new(MemoryRelationshipStore::new()))
    }

    pub fn with_relationship_store(relationship_store: Arc<MemoryRelationshipStore>) -> Self {
        let config = test_config();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let store_timeout = config.session.store_timeout();

        let directory = Arc::new(MemoryMemberDirectory::new());
        let deny_list = Arc::new(MemoryDenyList::new());
        let credentials = Arc::new(MemoryCredentialStore::new());

        let vault = CredentialVault::new(
            credentials.clone(),
            config.security.remember_signing_key.as_bytes(),
            config.session.remember_ttl(),
            dyn_clock.clone(),
            store_timeout,
        );
        let authenticator = SessionAuthenticator::new(
            vault,
            deny_list.clone(),
            directory.clone(),
            store_timeout,
        );
        let adapters =
            AdapterRegistry::new(Arc::new(PasswordAuthAdapter::new(directory.clone())));
        let forgery_guard = ForgeryGuard::new(
            config.security.csrf_secret.as_bytes(),
            config.security.csrf_token_ttl_seconds,
            Arc::new(MemoryNonceCache::new(dyn_clock.clone())),
            dyn_clock.clone(),
            store_timeout,
        );
        let relationships = RelationshipService::new(relationship_store.clone(), store_timeout);

        let state = AppState {
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
            config,
            relationships,
            authenticator,
            adapters,
            forgery_guard,
            sessions: Arc::new(MemorySessionStore::new(dyn_clock)),
        };

        Self {
            state,
            clock,
            directory,
            deny_list,
            credentials,
            relationship_store,
        }
    }

    /// Add an active member whose login id is `<identity>@example.com`.
    pub fn seed_member(&self, identity: &str) -> Identity {
        let identity = Identity::parse(identity).unwrap();
        let hash = hash_password(&Password::new(TEST_PASSWORD)).unwrap();
        self.directory
            .upsert(Member::new(
                identity.clone(),
                Some(login_id(identity.as_str())),
                Some(hash),
            ))
            .unwrap();
        identity
    }

    pub async fn router(&self) -> Router {
        build_router(self.state.clone())
            .await
            .expect("Failed to build router")
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }
}

pub fn login_id(identity: &str) -> String {
    format!("{}@example.com", identity)
}

pub fn id(raw: &str) -> Identity {
    Identity::parse(raw).unwrap()
}

/// Cookies from `Set-Cookie` headers as `(name, value, full header)`.
pub fn set_cookies(response: &Response<Body>) -> Vec<(String, String, String)> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string(), raw.to_string()))
        })
        .collect()
}

/// Client-side cookie jar, just enough to replay cookies across requests.
#[derive(Debug, Default, Clone)]
pub struct Jar {
    cookies: Vec<(String, String)>,
}

impl Jar {
    pub fn absorb(&mut self, response: &Response<Body>) {
        for (name, value, _) in set_cookies(response) {
            self.cookies.retain(|(n, _)| *n != name);
            if !value.is_empty() {
                self.cookies.push((name, value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.retain(|(n, _)| n != name);
    }

    pub fn header(&self) -> String {
        self.cookies
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn request(method: &str, uri: &str, jar: &Jar) -> axum::http::request::Builder {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, TEST_HOST);
    if jar.cookies.is_empty() {
        builder
    } else {
        builder.header(header::COOKIE, jar.header())
    }
}

pub fn json_request(method: &str, uri: &str, jar: &Jar, body: serde_json::Value) -> Request<Body> {
    request(method, uri, jar)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub const SLOW: Duration = Duration::from_secs(5);
