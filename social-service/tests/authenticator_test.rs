mod common;

use async_trait::async_trait;
use common::{id, login_id, test_config, TestApp, TEST_HOST, TEST_PASSWORD};
use social_service::{
    models::{
        AuthForm, Identity, Member, RegisterForm, RememberBlob, RememberToken, Session,
        MEMBER_CREDENTIAL,
    },
    services::{
        CredentialStore, CredentialVault, ManualClock, MemberCache, MemoryDenyList,
        MemoryMemberDirectory, ServiceError, SessionAuthenticator,
    },
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn password_form(identity: &str, password: &str) -> AuthForm {
    AuthForm::default()
        .with_field("login_id", login_id(identity))
        .with_field("password", password)
}

#[tokio::test]
async fn test_login_binds_identity_and_credential() {
    let app = TestApp::new();
    let alice = app.seed_member("alice");
    let authenticator = &app.state.authenticator;
    let adapter = app.state.adapters.get(None).unwrap();

    let mut session = Session::default();
    let outcome = authenticator
        .login(
            &mut session,
            adapter.as_ref(),
            &password_form("alice", TEST_PASSWORD).next(Some("/home".into())),
            TEST_HOST,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.redirect, "/home");
    assert!(outcome.remember_cookie.is_none());
    assert_eq!(session.identity, Some(alice));
    assert!(session.is_authenticated());
    assert!(session.has_credential(MEMBER_CREDENTIAL));
    assert_eq!(session.auth_mode.as_deref(), Some("password"));
}

#[tokio::test]
async fn test_failed_login_leaves_session_untouched() {
    let app = TestApp::new();
    app.seed_member("alice");
    let adapter = app.state.adapters.get(None).unwrap();

    let mut session = Session {
        auth_mode: Some("password".to_string()),
        ..Session::default()
    };
    let before = session.clone();
    let result = app
        .state
        .authenticator
        .login(
            &mut session,
            adapter.as_ref(),
            &password_form("alice", "wrong"),
            TEST_HOST,
            None,
        )
        .await;

    assert!(matches!(result, Err(ServiceError::AuthenticationFailed)));
    assert_eq!(session, before);
}

#[tokio::test]
async fn test_denied_login_clears_session() {
    let app = TestApp::new();
    let alice = app.seed_member("alice");
    app.deny_list.deny(alice.clone()).unwrap();
    let adapter = app.state.adapters.get(None).unwrap();

    let mut session = Session::default();
    let result = app
        .state
        .authenticator
        .login(
            &mut session,
            adapter.as_ref(),
            &password_form("alice", TEST_PASSWORD).remember_me(true),
            TEST_HOST,
            None,
        )
        .await;

    assert!(matches!(result, Err(ServiceError::Denied)));
    assert!(session.identity.is_none());
    assert!(!session.authenticated);
    assert!(app.credentials.is_empty());
}

#[tokio::test]
async fn test_remember_me_round_trip() {
    let app = TestApp::new();
    let alice = app.seed_member("alice");
    let authenticator = &app.state.authenticator;
    let adapter = app.state.adapters.get(None).unwrap();

    let mut session = Session::default();
    let outcome = authenticator
        .login(
            &mut session,
            adapter.as_ref(),
            &password_form("alice", TEST_PASSWORD).remember_me(true),
            TEST_HOST,
            None,
        )
        .await
        .unwrap();
    let cookie = outcome.remember_cookie.unwrap();
    assert!(!cookie.is_removal());

    let mut fresh = Session::default();
    let identity = authenticator
        .resolve_from_remember_token(&mut fresh, &cookie.value)
        .await
        .unwrap();
    assert_eq!(identity, alice);
    // Resolution alone never authenticates
    assert!(!fresh.is_authenticated());

    authenticator.confirm(&mut fresh).await.unwrap();
    assert!(fresh.is_authenticated());
    assert!(fresh.has_credential(MEMBER_CREDENTIAL));
}

#[tokio::test]
async fn test_relogin_invalidates_previous_remember_token() {
    let app = TestApp::new();
    app.seed_member("alice");
    let authenticator = &app.state.authenticator;
    let adapter = app.state.adapters.get(None).unwrap();
    let form = password_form("alice", TEST_PASSWORD).remember_me(true);

    let mut first = Session::default();
    let old = authenticator
        .login(&mut first, adapter.as_ref(), &form, TEST_HOST, None)
        .await
        .unwrap()
        .remember_cookie
        .unwrap();
    let mut second = Session::default();
    authenticator
        .login(&mut second, adapter.as_ref(), &form, TEST_HOST, None)
        .await
        .unwrap();

    let mut fresh = Session::default();
    let result = authenticator
        .resolve_from_remember_token(&mut fresh, &old.value)
        .await;
    assert!(matches!(result, Err(ServiceError::Invalid)));
    assert!(fresh.identity.is_none());
}

#[tokio::test]
async fn test_logout_revokes_and_keeps_auth_mode() {
    let app = TestApp::new();
    app.seed_member("alice");
    let authenticator = &app.state.authenticator;
    let adapter = app.state.adapters.get(None).unwrap();

    let mut session = Session::default();
    let cookie = authenticator
        .login(
            &mut session,
            adapter.as_ref(),
            &password_form("alice", TEST_PASSWORD).remember_me(true),
            TEST_HOST,
            None,
        )
        .await
        .unwrap()
        .remember_cookie
        .unwrap();

    let removal = authenticator.logout(&mut session, TEST_HOST).await;

    assert!(removal.is_removal());
    assert_eq!(removal.name, cookie.name);
    assert!(session.identity.is_none());
    assert!(!session.authenticated);
    assert!(session.credentials.is_empty());
    assert_eq!(session.auth_mode.as_deref(), Some("password"));
    assert!(app.credentials.is_empty());

    // Logging out an anonymous session is harmless
    let again = authenticator.logout(&mut session, TEST_HOST).await;
    assert!(again.is_removal());
}

#[tokio::test]
async fn test_resolve_keeps_already_bound_identity() {
    let app = TestApp::new();
    let alice = app.seed_member("alice");

    let mut session = Session {
        identity: Some(alice.clone()),
        ..Session::default()
    };
    let identity = app
        .state
        .authenticator
        .resolve_from_remember_token(&mut session, "garbage")
        .await
        .unwrap();
    assert_eq!(identity, alice);
}

#[tokio::test]
async fn test_forged_blob_is_invalid() {
    let app = TestApp::new();
    app.seed_member("alice");

    let forged = RememberBlob::encode(&id("alice"), "guess", b"some-other-signing-key-000000000")
        .unwrap();
    let mut session = Session {
        auth_mode: Some("password".to_string()),
        ..Session::default()
    };
    let result = app
        .state
        .authenticator
        .resolve_from_remember_token(&mut session, forged.as_str())
        .await;

    assert!(matches!(result, Err(ServiceError::Invalid)));
    assert_eq!(session.auth_mode.as_deref(), Some("password"));
}

#[tokio::test]
async fn test_confirm_rechecks_member() {
    let app = TestApp::new();
    let alice = app.seed_member("alice");
    let authenticator = &app.state.authenticator;

    // Deactivated members keep their identity but lose authentication
    let mut inactive = Member::new(alice.clone(), Some(login_id("alice")), None);
    inactive.is_active = false;
    app.directory.upsert(inactive).unwrap();
    let mut session = Session {
        identity: Some(alice.clone()),
        authenticated: true,
        ..Session::default()
    };
    assert!(matches!(
        authenticator.confirm(&mut session).await,
        Err(ServiceError::AuthenticationFailed)
    ));
    assert_eq!(session.identity, Some(alice.clone()));
    assert!(!session.is_authenticated());

    // Deny-listed members are thrown out entirely
    app.deny_list.deny(alice.clone()).unwrap();
    assert!(matches!(
        authenticator.confirm(&mut session).await,
        Err(ServiceError::Denied)
    ));
    assert!(session.identity.is_none());

    // Unknown members too
    let mut ghost = Session {
        identity: Some(id("ghost")),
        ..Session::default()
    };
    assert!(matches!(
        authenticator.confirm(&mut ghost).await,
        Err(ServiceError::AuthenticationFailed)
    ));
    assert!(ghost.identity.is_none());

    assert!(matches!(
        authenticator.confirm(&mut Session::default()).await,
        Err(ServiceError::AuthenticationFailed)
    ));
}

#[tokio::test]
async fn test_register_logs_in_new_member() {
    let app = TestApp::new();
    let authenticator = &app.state.authenticator;
    let adapter = app.state.adapters.get(None).unwrap();

    let form = RegisterForm::default()
        .with_field("login_id", "dave@example.com")
        .with_field("password", "long-enough-password")
        .with_field("identity", "dave");
    let mut session = Session::default();
    let identity = authenticator
        .register(&mut session, adapter.as_ref(), &form)
        .await
        .unwrap();

    assert_eq!(identity, id("dave"));
    assert!(session.is_authenticated());
    assert!(authenticator
        .is_register_finish(&session, adapter.as_ref())
        .await
        .unwrap());

    // Same login id again is refused
    let mut other = Session::default();
    let result = authenticator
        .register(
            &mut other,
            adapter.as_ref(),
            &form.clone().with_field("identity", "dave2"),
        )
        .await;
    assert!(matches!(result, Err(ServiceError::AuthenticationFailed)));
    assert!(other.identity.is_none());
}

#[tokio::test]
async fn test_register_token_binds_pending_member() {
    let app = TestApp::new();
    let authenticator = &app.state.authenticator;
    let adapter = app.state.adapters.get(None).unwrap();

    let mut invited = Member::new(id("erin"), Some(login_id("erin")), None);
    invited.register_token = Some("invite-123".to_string());
    app.directory.upsert(invited).unwrap();

    let mut session = Session::default();
    assert!(!authenticator
        .set_register_token(&mut session, "unknown")
        .await
        .unwrap());
    assert!(session.identity.is_none());

    assert!(authenticator
        .set_register_token(&mut session, "invite-123")
        .await
        .unwrap());
    assert_eq!(session.identity, Some(id("erin")));
    assert!(!session.is_authenticated());
    assert!(authenticator
        .is_register_begin(&session, adapter.as_ref())
        .await
        .unwrap());
    assert!(!authenticator
        .is_register_finish(&session, adapter.as_ref())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_member_snapshot() {
    let app = TestApp::new();
    let alice = app.seed_member("alice");
    let authenticator = &app.state.authenticator;
    let mut cache = MemberCache::new();

    let anonymous = authenticator
        .member(&Session::default(), &mut cache)
        .await
        .unwrap();
    assert!(anonymous.is_anonymous());

    let session = Session {
        identity: Some(alice.clone()),
        ..Session::default()
    };
    let member = authenticator.member(&session, &mut cache).await.unwrap();
    assert_eq!(member.identity, alice);
    assert_eq!(member.login_id, Some(login_id("alice")));
}

/// Credential store holding an entry that no longer deserializes.
#[derive(Default)]
struct UnreadableCredentials {
    deletes: AtomicUsize,
}

#[async_trait]
impl CredentialStore for UnreadableCredentials {
    async fn put(&self, _token: &RememberToken) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn get(
        &self,
        _identity: &Identity,
        _purpose: &str,
    ) -> Result<Option<RememberToken>, ServiceError> {
        Err(ServiceError::Corrupt("credential entry: expected value".to_string()))
    }

    async fn delete(&self, _identity: &Identity, _purpose: &str) -> Result<(), ServiceError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_corrupt_vault_entry_forces_logout() {
    let config = test_config();
    let key = config.security.remember_signing_key.as_bytes();
    let store = Arc::new(UnreadableCredentials::default());
    let vault = CredentialVault::new(
        store.clone(),
        key,
        config.session.remember_ttl(),
        Arc::new(ManualClock::default()),
        config.session.store_timeout(),
    );
    let authenticator = SessionAuthenticator::new(
        vault,
        Arc::new(MemoryDenyList::new()),
        Arc::new(MemoryMemberDirectory::new()),
        config.session.store_timeout(),
    );

    let blob = RememberBlob::encode(&id("alice"), "secret", key).unwrap();
    let mut session = Session {
        auth_mode: Some("password".to_string()),
        ..Session::default()
    };
    let result = authenticator
        .resolve_from_remember_token(&mut session, blob.as_str())
        .await;

    assert!(matches!(result, Err(ServiceError::Invalid)));
    assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    assert!(session.identity.is_none());
    assert_eq!(session.auth_mode.as_deref(), Some("password"));
}
