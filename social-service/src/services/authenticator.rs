use std::sync::Arc;
use std::time::Duration;

use crate::models::{
    AuthForm, Identity, Member, RegisterForm, RememberCookie, Session, MEMBER_CREDENTIAL,
};
use crate::services::{
    adapters::AuthAdapter, bounded, metrics, CredentialVault, DenyList, MemberCache,
    MemberDirectory, ServiceError,
};

const STORE: &str = "member";

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Where the client should go next.
    pub redirect: String,
    /// Set when the form asked to be remembered.
    pub remember_cookie: Option<RememberCookie>,
}

/// Drives a [`Session`] between Anonymous and Authenticated.
///
/// The adapter is passed in on each call; nothing here remembers which
/// adapter a session used apart from the `auth_mode` name on the session.
#[derive(Clone)]
pub struct SessionAuthenticator {
    vault: CredentialVault,
    deny_list: Arc<dyn DenyList>,
    directory: Arc<dyn MemberDirectory>,
    store_timeout: Duration,
}

impl SessionAuthenticator {
    pub fn new(
        vault: CredentialVault,
        deny_list: Arc<dyn DenyList>,
        directory: Arc<dyn MemberDirectory>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            vault,
            deny_list,
            directory,
            store_timeout,
        }
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn directory(&self) -> &Arc<dyn MemberDirectory> {
        &self.directory
    }

    pub async fn login(
        &self,
        session: &mut Session,
        adapter: &dyn AuthAdapter,
        form: &AuthForm,
        host: &str,
        explicit: Option<Identity>,
    ) -> Result<LoginOutcome, ServiceError> {
        let identity = match explicit {
            Some(identity) => Some(identity),
            None => adapter.authenticate(form).await?,
        };
        let Some(identity) = identity.filter(|id| !id.is_anonymous()) else {
            metrics::record_auth_event("login", "failed");
            tracing::info!(auth_mode = adapter.auth_mode_name(), "Login failed");
            return Err(ServiceError::AuthenticationFailed);
        };

        if self.is_denied(&identity).await? {
            session.identity = Some(identity.clone());
            self.clear(session).await;
            metrics::record_auth_event("login", "denied");
            tracing::warn!(identity = %identity, "Login refused for deny-listed member");
            return Err(ServiceError::Denied);
        }

        let active = self.is_active_member(&identity).await?;
        let remember_cookie = if form.is_remember_me {
            let blob = self.vault.issue(&identity).await?;
            let expires = self.vault.clock().now() + self.vault.ttl();
            Some(RememberCookie::issue(host, blob, expires))
        } else {
            None
        };

        session.identity = Some(identity.clone());
        session.authenticated = true;
        set_member_credential(session, active);
        session.auth_mode = Some(adapter.auth_mode_name().to_string());

        metrics::record_auth_event("login", "ok");
        tracing::info!(
            identity = %identity,
            auth_mode = adapter.auth_mode_name(),
            remember_me = form.is_remember_me,
            "Member logged in"
        );
        Ok(LoginOutcome {
            redirect: form.next_uri.clone(),
            remember_cookie,
        })
    }

    /// Revoke the remember secret and clear the session, keeping only the
    /// auth mode. Never fails; vault errors are logged.
    pub async fn logout(&self, session: &mut Session, host: &str) -> RememberCookie {
        if let Some(identity) = session.identity.as_ref() {
            tracing::info!(identity = %identity, "Member logged out");
        }
        self.clear(session).await;
        metrics::record_auth_event("logout", "ok");
        RememberCookie::removal(host)
    }

    /// Bind the identity named by a remember blob to an anonymous session.
    ///
    /// The session stays unauthenticated; call [`confirm`](Self::confirm)
    /// afterwards. An `Invalid` blob resets the session.
    pub async fn resolve_from_remember_token(
        &self,
        session: &mut Session,
        raw: &str,
    ) -> Result<Identity, ServiceError> {
        if let Some(identity) = session.identity.clone() {
            return Ok(identity);
        }

        match self.vault.validate(raw).await {
            Ok(identity) => {
                session.identity = Some(identity.clone());
                metrics::record_auth_event("remember", "ok");
                tracing::debug!(identity = %identity, "Session resolved from remember token");
                Ok(identity)
            }
            Err(ServiceError::Invalid) => {
                session.clear_preserving_auth_mode();
                metrics::record_auth_event("remember", "invalid");
                tracing::info!("Discarding invalid remember token");
                Err(ServiceError::Invalid)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-check the bound member and mark the session authenticated.
    pub async fn confirm(&self, session: &mut Session) -> Result<(), ServiceError> {
        let Some(identity) = session.identity.clone() else {
            return Err(ServiceError::AuthenticationFailed);
        };

        if self.is_denied(&identity).await? {
            self.clear(session).await;
            metrics::record_auth_event("confirm", "denied");
            tracing::warn!(identity = %identity, "Session refused for deny-listed member");
            return Err(ServiceError::Denied);
        }

        let member = bounded(self.store_timeout, STORE, self.directory.find(&identity)).await?;
        match member {
            Some(member) if member.is_active => {
                session.authenticated = true;
                set_member_credential(session, true);
                Ok(())
            }
            Some(_) => {
                session.authenticated = false;
                set_member_credential(session, false);
                Err(ServiceError::AuthenticationFailed)
            }
            None => {
                tracing::info!(identity = %identity, "Session bound to unknown member");
                self.clear(session).await;
                Err(ServiceError::AuthenticationFailed)
            }
        }
    }

    /// Create a member through `adapter` and log the session in as it.
    pub async fn register(
        &self,
        session: &mut Session,
        adapter: &dyn AuthAdapter,
        form: &RegisterForm,
    ) -> Result<Identity, ServiceError> {
        let Some(identity) = adapter.register(form).await? else {
            metrics::record_auth_event("register", "failed");
            return Err(ServiceError::AuthenticationFailed);
        };

        let active = self.is_active_member(&identity).await?;
        session.identity = Some(identity.clone());
        session.authenticated = true;
        session.auth_mode = Some(adapter.auth_mode_name().to_string());
        set_member_credential(session, active);

        metrics::record_auth_event("register", "ok");
        tracing::info!(identity = %identity, "Member registered");
        Ok(identity)
    }

    pub async fn is_register_begin(
        &self,
        session: &Session,
        adapter: &dyn AuthAdapter,
    ) -> Result<bool, ServiceError> {
        adapter.is_register_begin(session.identity.as_ref()).await
    }

    pub async fn is_register_finish(
        &self,
        session: &Session,
        adapter: &dyn AuthAdapter,
    ) -> Result<bool, ServiceError> {
        match session.identity.as_ref() {
            Some(identity) => adapter.is_register_finish(identity).await,
            None => Ok(false),
        }
    }

    /// Bind the member that owns a registration token. `false` when no
    /// member owns it.
    pub async fn set_register_token(
        &self,
        session: &mut Session,
        token: &str,
    ) -> Result<bool, ServiceError> {
        let lookup = self.directory.find_by_register_token(token);
        match bounded(self.store_timeout, STORE, lookup).await? {
            Some(member) => {
                session.identity = Some(member.identity);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot of the bound member, or the anonymous member.
    pub async fn member(
        &self,
        session: &Session,
        cache: &mut MemberCache,
    ) -> Result<Member, ServiceError> {
        let Some(identity) = session.identity.as_ref() else {
            return Ok(Member::anonymous());
        };
        let lookup = cache.get_or_load(identity, self.directory.as_ref());
        Ok(bounded(self.store_timeout, STORE, lookup)
            .await?
            .unwrap_or_else(Member::anonymous))
    }

    async fn is_denied(&self, identity: &Identity) -> Result<bool, ServiceError> {
        bounded(
            self.store_timeout,
            "deny_list",
            self.deny_list.is_denied(identity),
        )
        .await
    }

    async fn is_active_member(&self, identity: &Identity) -> Result<bool, ServiceError> {
        Ok(bounded(self.store_timeout, STORE, self.directory.find(identity))
            .await?
            .is_some_and(|m| m.is_active))
    }

    async fn clear(&self, session: &mut Session) {
        if let Some(identity) = session.identity.as_ref() {
            if let Err(e) = self.vault.revoke(identity).await {
                tracing::warn!(identity = %identity, error = %e, "Failed to revoke remember token");
            }
        }
        session.clear_preserving_auth_mode();
    }
}

/// Grant or drop the active-member credential.
fn set_member_credential(session: &mut Session, active: bool) {
    if active {
        session.credentials.insert(MEMBER_CREDENTIAL.to_string());
    } else {
        session.credentials.remove(MEMBER_CREDENTIAL);
    }
}
