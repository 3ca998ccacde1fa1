use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{AuthForm, Identity, Member, RegisterForm};
use crate::services::{adapters::AuthAdapter, MemberDirectory, ServiceError};
use crate::utils::{hash_password, verify_password, Password};

pub const AUTH_MODE: &str = "password";

/// Login id plus password, checked with argon2 against the member directory.
pub struct PasswordAuthAdapter {
    directory: Arc<dyn MemberDirectory>,
}

impl PasswordAuthAdapter {
    pub fn new(directory: Arc<dyn MemberDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AuthAdapter for PasswordAuthAdapter {
    fn auth_mode_name(&self) -> &str {
        AUTH_MODE
    }

    async fn authenticate(&self, form: &AuthForm) -> Result<Option<Identity>, ServiceError> {
        let (Some(login_id), Some(password)) = (form.field("login_id"), form.field("password"))
        else {
            return Ok(None);
        };

        let Some(member) = self.directory.find_by_login(login_id).await? else {
            tracing::debug!("Login attempt for unknown login id");
            return Ok(None);
        };
        let Some(hash) = member.password_hash.as_deref() else {
            return Ok(None);
        };

        if verify_password(&Password::new(password), hash)? {
            Ok(Some(member.identity))
        } else {
            tracing::debug!(identity = %member.identity, "Password mismatch");
            Ok(None)
        }
    }

    async fn register(&self, form: &RegisterForm) -> Result<Option<Identity>, ServiceError> {
        let (Some(login_id), Some(password)) = (form.field("login_id"), form.field("password"))
        else {
            return Ok(None);
        };

        let identity = match form.field("identity") {
            Some(raw) => Identity::parse(raw)?,
            None => Identity::parse(uuid::Uuid::new_v4().simple().to_string())?,
        };
        if self.directory.find_by_login(login_id).await?.is_some() {
            return Ok(None);
        }

        let hash = hash_password(&Password::new(password))?;
        let member = Member::new(identity.clone(), Some(login_id.to_string()), Some(hash));
        match self.directory.create(&member).await {
            Ok(()) => Ok(Some(identity)),
            Err(ServiceError::ValidationError(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn is_register_begin(&self, identity: Option<&Identity>) -> Result<bool, ServiceError> {
        let Some(identity) = identity else {
            return Ok(false);
        };
        Ok(self
            .directory
            .find(identity)
            .await?
            .is_some_and(|m| m.register_token.is_some()))
    }

    async fn is_register_finish(&self, identity: &Identity) -> Result<bool, ServiceError> {
        Ok(self
            .directory
            .find(identity)
            .await?
            .is_some_and(|m| m.is_active && m.register_token.is_none()))
    }
}
