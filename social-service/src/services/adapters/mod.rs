//! Pluggable login back-ends.
//!
//! An adapter turns a submitted form into an identity. The authenticator
//! never knows how; it receives the adapter to use on every call.

mod password;

pub use password::PasswordAuthAdapter;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{AuthForm, Identity, RegisterForm};
use crate::services::ServiceError;

#[async_trait]
pub trait AuthAdapter: Send + Sync {
    /// Stable name recorded on the session as its auth mode.
    fn auth_mode_name(&self) -> &str;

    /// `Ok(None)` when the form does not identify a member.
    async fn authenticate(&self, form: &AuthForm) -> Result<Option<Identity>, ServiceError>;

    /// `Ok(None)` when the adapter refuses the registration.
    async fn register(&self, form: &RegisterForm) -> Result<Option<Identity>, ServiceError>;

    /// Whether `identity` is in the middle of a registration.
    async fn is_register_begin(&self, identity: Option<&Identity>) -> Result<bool, ServiceError>;

    /// Whether `identity` has completed registration.
    async fn is_register_finish(&self, identity: &Identity) -> Result<bool, ServiceError>;
}

/// Adapters available to the HTTP layer, selected by auth mode name.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn AuthAdapter>>,
    default_mode: String,
}

impl AdapterRegistry {
    pub fn new(default: Arc<dyn AuthAdapter>) -> Self {
        let default_mode = default.auth_mode_name().to_string();
        let mut adapters = HashMap::new();
        adapters.insert(default_mode.clone(), default);
        Self {
            adapters,
            default_mode,
        }
    }

    pub fn with(mut self, adapter: Arc<dyn AuthAdapter>) -> Self {
        self.adapters
            .insert(adapter.auth_mode_name().to_string(), adapter);
        self
    }

    pub fn default_mode(&self) -> &str {
        &self.default_mode
    }

    /// Adapter for `mode`, or the default one when no mode is given.
    pub fn get(&self, mode: Option<&str>) -> Result<Arc<dyn AuthAdapter>, ServiceError> {
        let mode = mode.unwrap_or(&self.default_mode);
        self.adapters.get(mode).cloned().ok_or_else(|| {
            ServiceError::ValidationError(format!("Unknown auth mode: {}", mode))
        })
    }
}
