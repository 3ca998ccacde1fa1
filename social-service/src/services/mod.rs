//! Services layer for social-service.
//!
//! Relationship state machine, credential vault, session authenticator and
//! the stores they run on.

pub mod adapters;
mod authenticator;
mod clock;
mod credential_store;
mod csrf;
mod database;
mod deny_list;
pub mod error;
mod keyed_lock;
mod member_cache;
mod member_directory;
pub mod metrics;
mod nonce_cache;
pub mod redis;
pub mod relationship_store;
mod relationships;
mod session_store;
pub mod state_machine;
mod vault;

pub use adapters::{AdapterRegistry, AuthAdapter, PasswordAuthAdapter};
pub use authenticator::{LoginOutcome, SessionAuthenticator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential_store::{CredentialStore, MemoryCredentialStore};
pub use csrf::ForgeryGuard;
pub use database::Database;
pub use deny_list::{DenyList, MemoryDenyList};
pub use error::ServiceError;
pub use keyed_lock::KeyedLocks;
pub use member_cache::MemberCache;
pub use member_directory::{MemberDirectory, MemoryMemberDirectory};
pub use nonce_cache::{MemoryNonceCache, NonceCache};
pub use redis::RedisService;
pub use relationship_store::{MemoryRelationshipStore, RelationshipStore};
pub use relationships::RelationshipService;
pub use session_store::{MemorySessionStore, SessionStore};
pub use vault::CredentialVault;

use std::future::Future;
use std::time::Duration;

/// Bound a store call by `timeout`; an elapsed call is `StoreUnavailable`.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    store: &'static str,
    call: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    tokio::time::timeout(timeout, call).await.map_err(|_| {
        tracing::warn!(
            store,
            timeout_ms = timeout.as_millis() as u64,
            "Store call timed out"
        );
        ServiceError::StoreUnavailable
    })?
}
