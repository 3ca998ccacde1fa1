mod common;

use axum::{body::Body, http::StatusCode, Router};
use common::{
    body_json, json_request, login_id, request, set_cookies, Jar, TestApp, TEST_HOST,
    TEST_PASSWORD,
};
use serde_json::json;
use social_service::{
    middleware::{CSRF_HEADER, SESSION_COOKIE},
    models::{RelationshipState, RememberCookie},
    services::{MemoryRelationshipStore, RelationshipStore},
};
use std::sync::Arc;
use tower::util::ServiceExt;

async fn login(app: &Router, jar: &mut Jar, identity: &str, remember_me: bool) -> StatusCode {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            jar,
            json!({
                "login_id": login_id(identity),
                "password": TEST_PASSWORD,
                "remember_me": remember_me,
            }),
        ))
        .await
        .unwrap();
    jar.absorb(&response);
    response.status()
}

async fn csrf_token(app: &Router, jar: &mut Jar) -> String {
    let response = app
        .clone()
        .oneshot(request("GET", "/auth/csrf", jar).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    jar.absorb(&response);
    body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn relationship_action(
    app: &Router,
    jar: &mut Jar,
    other: &str,
    action: &str,
    token: Option<&str>,
) -> axum::http::Response<Body> {
    let mut builder = request("POST", &format!("/relationships/{}/{}", other, action), jar);
    if let Some(token) = token {
        builder = builder.header(CSRF_HEADER, token);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    jar.absorb(&response);
    response
}

async fn me(app: &Router, jar: &mut Jar) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(request("GET", "/auth/me", jar).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    jar.absorb(&response);
    body_json(response).await
}

#[tokio::test]
async fn test_login_sets_hardened_cookies() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    let app = test_app.router().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            &Jar::default(),
            json!({
                "login_id": login_id("alice"),
                "password": TEST_PASSWORD,
                "remember_me": true,
                "next_uri": "/friends",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let remember_name = RememberCookie::cookie_name(TEST_HOST);
    let session = cookies.iter().find(|(n, _, _)| n == SESSION_COOKIE).unwrap();
    let remember = cookies.iter().find(|(n, _, _)| *n == remember_name).unwrap();

    for (_, value, raw) in [session, remember] {
        assert!(!value.is_empty());
        assert!(raw.contains("HttpOnly"));
        assert!(raw.contains("Secure"));
    }
    assert!(remember.2.contains("Expires"));

    let body = body_json(response).await;
    assert_eq!(body["identity"], "alice");
    assert_eq!(body["redirect"], "/friends");
    assert_eq!(body["remembered"], true);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    let app = test_app.router().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            &Jar::default(),
            json!({ "login_id": login_id("alice"), "password": "nope" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let remember_name = RememberCookie::cookie_name(TEST_HOST);
    assert!(set_cookies(&response).iter().all(|(n, _, _)| *n != remember_name));
}

#[tokio::test]
async fn test_remember_cookie_restores_session() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    let app = test_app.router().await;

    let mut jar = Jar::default();
    assert_eq!(login(&app, &mut jar, "alice", true).await, StatusCode::OK);
    let first_sid = jar.get(SESSION_COOKIE).unwrap().to_string();

    // Browser restart: the session cookie is gone, the remember cookie stays
    jar.remove(SESSION_COOKIE);
    let body = me(&app, &mut jar).await;

    assert_eq!(body["identity"], "alice");
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["is_member"], true);
    assert_ne!(jar.get(SESSION_COOKIE).unwrap(), first_sid);
}

#[tokio::test]
async fn test_expired_remember_cookie_is_cleared() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    let app = test_app.router().await;

    let mut jar = Jar::default();
    login(&app, &mut jar, "alice", true).await;
    jar.remove(SESSION_COOKIE);
    test_app.advance(chrono::Duration::days(31));

    let response = app
        .clone()
        .oneshot(request("GET", "/auth/me", &jar).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let remember_name = RememberCookie::cookie_name(TEST_HOST);
    let removal = set_cookies(&response)
        .into_iter()
        .find(|(n, _, _)| *n == remember_name)
        .unwrap();
    assert!(removal.1.is_empty());

    let body = body_json(response).await;
    assert_eq!(body["authenticated"], false);
    assert!(body["identity"].is_null());
}

#[tokio::test]
async fn test_forged_remember_cookie_is_ignored() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    let app = test_app.router().await;

    let remember_name = RememberCookie::cookie_name(TEST_HOST);
    let response = app
        .clone()
        .oneshot(
            request("GET", "/auth/me", &Jar::default())
                .header("cookie", format!("{}=YWxpY2V8Z3Vlc3M.deadbeef", remember_name))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(set_cookies(&response)
        .iter()
        .any(|(n, v, _)| *n == remember_name && v.is_empty()));
    assert_eq!(body_json(response).await["authenticated"], false);
}

#[tokio::test]
async fn test_logout_clears_session_but_keeps_auth_mode() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    let app = test_app.router().await;

    let mut jar = Jar::default();
    login(&app, &mut jar, "alice", true).await;
    assert_eq!(test_app.credentials.len(), 1);

    let response = app
        .clone()
        .oneshot(request("POST", "/auth/logout", &jar).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    jar.absorb(&response);

    let remember_name = RememberCookie::cookie_name(TEST_HOST);
    assert!(jar.get(&remember_name).is_none());
    assert_eq!(test_app.credentials.len(), 0);

    let body = me(&app, &mut jar).await;
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["auth_mode"], "password");
    assert!(body["identity"].is_null());
}

#[tokio::test]
async fn test_denied_member_cannot_log_in() {
    let test_app = TestApp::new();
    let alice = test_app.seed_member("alice");
    test_app.deny_list.deny(alice).unwrap();
    let app = test_app.router().await;

    let mut jar = Jar::default();
    assert_eq!(
        login(&app, &mut jar, "alice", true).await,
        StatusCode::FORBIDDEN
    );

    let body = me(&app, &mut jar).await;
    assert_eq!(body["authenticated"], false);
    assert!(body["identity"].is_null());
    assert_eq!(test_app.credentials.len(), 0);
}

#[tokio::test]
async fn test_state_change_requires_anti_forgery_token() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    test_app.seed_member("bob");
    let app = test_app.router().await;

    let mut jar = Jar::default();
    login(&app, &mut jar, "alice", false).await;

    let missing = relationship_action(&app, &mut jar, "bob", "request", None).await;
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    let token = csrf_token(&app, &mut jar).await;
    let (prefix, _) = token.rsplit_once('.').unwrap();
    let forged = format!("{}.{}", prefix, "0".repeat(64));
    let forged = relationship_action(&app, &mut jar, "bob", "request", Some(&forged)).await;
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);

    let ok = relationship_action(&app, &mut jar, "bob", "request", Some(&token)).await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(body_json(ok).await["view"], "pending_out");

    let replay = relationship_action(&app, &mut jar, "bob", "unlink", Some(&token)).await;
    assert_eq!(replay.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_token_from_another_session_is_rejected() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    test_app.seed_member("bob");
    let app = test_app.router().await;

    let mut alice_jar = Jar::default();
    let mut bob_jar = Jar::default();
    login(&app, &mut alice_jar, "alice", false).await;
    login(&app, &mut bob_jar, "bob", false).await;

    let bobs_token = csrf_token(&app, &mut bob_jar).await;
    let response =
        relationship_action(&app, &mut alice_jar, "bob", "request", Some(&bobs_token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_anonymous_session_cannot_change_relationships() {
    let test_app = TestApp::new();
    test_app.seed_member("bob");
    let app = test_app.router().await;

    let mut jar = Jar::default();
    let token = csrf_token(&app, &mut jar).await;
    let response = relationship_action(&app, &mut jar, "bob", "request", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_friendship_over_http() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    test_app.seed_member("bob");
    let app = test_app.router().await;

    let mut alice = Jar::default();
    let mut bob = Jar::default();
    login(&app, &mut alice, "alice", false).await;
    login(&app, &mut bob, "bob", false).await;

    let token = csrf_token(&app, &mut alice).await;
    let response = relationship_action(&app, &mut alice, "bob", "request", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let view = app
        .clone()
        .oneshot(request("GET", "/relationships/alice", &bob).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(view).await["view"], "pending_in");

    let token = csrf_token(&app, &mut bob).await;
    let response = relationship_action(&app, &mut bob, "alice", "accept", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["view"], "friend");

    // Nothing left to accept once the request became a friendship
    let token = csrf_token(&app, &mut bob).await;
    let again = relationship_action(&app, &mut bob, "alice", "accept", Some(&token)).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let token = csrf_token(&app, &mut alice).await;
    let response = relationship_action(&app, &mut alice, "bob", "block", Some(&token)).await;
    assert_eq!(body_json(response).await["view"], "blocked");

    let token = csrf_token(&app, &mut bob).await;
    let response = relationship_action(&app, &mut bob, "alice", "request", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_request_again_after_unlink_over_http() {
    let test_app = TestApp::new();
    let alice_id = test_app.seed_member("alice");
    let bob_id = test_app.seed_member("bob");
    let app = test_app.router().await;

    let mut alice = Jar::default();
    let mut bob = Jar::default();
    login(&app, &mut alice, "alice", false).await;
    login(&app, &mut bob, "bob", false).await;

    let token = csrf_token(&app, &mut alice).await;
    let response = relationship_action(&app, &mut alice, "bob", "request", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let token = csrf_token(&app, &mut bob).await;
    let response = relationship_action(&app, &mut bob, "alice", "accept", Some(&token)).await;
    assert_eq!(body_json(response).await["view"], "friend");

    let token = csrf_token(&app, &mut bob).await;
    let response = relationship_action(&app, &mut bob, "alice", "unlink", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["view"], "none");

    let store = &test_app.relationship_store;
    assert_eq!(store.get(&alice_id, &bob_id).await.unwrap(), RelationshipState::None);
    assert_eq!(store.get(&bob_id, &alice_id).await.unwrap(), RelationshipState::None);

    let token = csrf_token(&app, &mut alice).await;
    let response = relationship_action(&app, &mut alice, "bob", "request", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["view"], "pending_out");
    assert_eq!(
        store.get(&alice_id, &bob_id).await.unwrap(),
        RelationshipState::PendingOut
    );
}

#[tokio::test]
async fn test_self_target_is_bad_request() {
    let test_app = TestApp::new();
    test_app.seed_member("alice");
    let app = test_app.router().await;

    let mut jar = Jar::default();
    login(&app, &mut jar, "alice", false).await;
    let token = csrf_token(&app, &mut jar).await;

    let response = relationship_action(&app, &mut jar, "alice", "request", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_slow_relationship_store_is_unavailable() {
    let test_app = TestApp::with_relationship_store(Arc::new(
        MemoryRelationshipStore::with_latency(common::SLOW),
    ));
    test_app.seed_member("alice");
    test_app.seed_member("bob");
    let app = test_app.router().await;

    let mut jar = Jar::default();
    login(&app, &mut jar, "alice", false).await;

    let response = app
        .clone()
        .oneshot(request("GET", "/relationships/bob", &jar).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_register_then_me() {
    let test_app = TestApp::new();
    let app = test_app.router().await;

    let mut jar = Jar::default();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            &jar,
            json!({
                "login_id": "carol@example.com",
                "password": "long-enough-password",
                "identity": "carol",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    jar.absorb(&response);

    let body = me(&app, &mut jar).await;
    assert_eq!(body["identity"], "carol");
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["login_id"], "carol@example.com");
    assert_eq!(body["register_finished"], true);
}

#[tokio::test]
async fn test_register_validates_input() {
    let test_app = TestApp::new();
    let app = test_app.router().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            &Jar::default(),
            json!({ "login_id": "not-an-email", "password": "short" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_health_and_metrics() {
    social_service::services::metrics::init_metrics().unwrap();
    let test_app = TestApp::new();
    let app = test_app.router().await;

    let health = app
        .clone()
        .oneshot(request("GET", "/health", &Jar::default()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["status"], "healthy");

    let metrics = app
        .clone()
        .oneshot(request("GET", "/metrics", &Jar::default()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    // Health and metrics never open a session
    assert!(set_cookies(&metrics).is_empty());
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = TestApp::new().router().await;

    let response = app
        .oneshot(
            request("GET", "/.well-known/openapi.json", &Jar::default())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let doc = body_json(response).await;
    assert!(doc["paths"]["/auth/login"]["post"].is_object());
    assert!(doc["paths"]["/relationships/{other}/accept"]["post"].is_object());
}
