use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{CsrfResponse, LoginRequest, LoginResponse, MeResponse},
        ErrorResponse, MessageResponse,
    },
    middleware::SessionHandle,
    models::RememberCookie,
    services::{MemberCache, ServiceError},
    utils::ValidatedJson,
    AppState,
};

/// Log in with an auth adapter
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Member is denied access", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many login attempts", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    handle: SessionHandle,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let adapter = state.adapters.get(req.auth_mode.as_deref())?;
    let form = req.to_form();

    let mut slot = handle.lock().await;
    let host = slot.host.clone();
    let result = state
        .authenticator
        .login(&mut slot.session, adapter.as_ref(), &form, &host, None)
        .await;

    match result {
        Ok(outcome) => {
            slot.rotate_id();
            let remembered = outcome.remember_cookie.is_some();
            if let Some(cookie) = outcome.remember_cookie {
                slot.push_remember_cookie(cookie);
            }
            let identity = slot.session.identity_or_anonymous().into_string();
            Ok((
                StatusCode::OK,
                Json(LoginResponse {
                    identity,
                    redirect: outcome.redirect,
                    remembered,
                }),
            ))
        }
        Err(ServiceError::Denied) => {
            slot.push_remember_cookie(RememberCookie::removal(&host));
            Err(ServiceError::Denied.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// End the session and forget the remember-me credential
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    handle: SessionHandle,
) -> Result<impl IntoResponse, AppError> {
    let mut slot = handle.lock().await;
    let host = slot.host.clone();
    let removal = state.authenticator.logout(&mut slot.session, &host).await;
    slot.rotate_id();
    slot.push_remember_cookie(removal);

    Ok((StatusCode::OK, Json(MessageResponse::new("Logged out successfully"))))
}

/// Describe the current session
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current session", body = MeResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn me(
    State(state): State<AppState>,
    handle: SessionHandle,
) -> Result<Json<MeResponse>, AppError> {
    let slot = handle.lock().await;
    let session = &slot.session;

    let mut cache = MemberCache::new();
    let member = state.authenticator.member(session, &mut cache).await?;
    let adapter = state.adapters.get(session.auth_mode.as_deref())?;
    let register_begun = state
        .authenticator
        .is_register_begin(session, adapter.as_ref())
        .await?;
    let register_finished = state
        .authenticator
        .is_register_finish(session, adapter.as_ref())
        .await?;

    Ok(Json(MeResponse {
        identity: session.identity.as_ref().map(|i| i.as_str().to_string()),
        authenticated: session.is_authenticated(),
        is_member: session.has_credential(crate::models::MEMBER_CREDENTIAL),
        auth_mode: session.auth_mode.clone(),
        login_id: member.login_id,
        register_begun,
        register_finished,
    }))
}

/// Issue a single-use anti-forgery token for this session
#[utoipa::path(
    get,
    path = "/auth/csrf",
    responses(
        (status = 200, description = "Token issued", body = CsrfResponse)
    ),
    tag = "Authentication"
)]
pub async fn csrf_token(
    State(state): State<AppState>,
    handle: SessionHandle,
) -> Result<Json<CsrfResponse>, AppError> {
    let session_id = handle.lock().await.id.clone();
    let token = state.forgery_guard.issue(&session_id)?;

    Ok(Json(CsrfResponse {
        token,
        expires_in: state.config.security.csrf_token_ttl_seconds,
    }))
}
