use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{RegisterRequest, RegisterResponse, RegisterTokenRequest},
        ErrorResponse, MessageResponse,
    },
    middleware::SessionHandle,
    utils::ValidatedJson,
    AppState,
};

/// Register a new member and log the session in as it
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Member registered", body = RegisterResponse),
        (status = 401, description = "Registration refused", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    handle: SessionHandle,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let adapter = state.adapters.get(req.auth_mode.as_deref())?;
    let form = req.to_form();

    let mut slot = handle.lock().await;
    let identity = state
        .authenticator
        .register(&mut slot.session, adapter.as_ref(), &form)
        .await?;
    slot.rotate_id();

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            identity: identity.into_string(),
            message: "Registration successful".to_string(),
        }),
    ))
}

/// Bind the session to the member owning a registration token
#[utoipa::path(
    post,
    path = "/auth/register/token",
    request_body = RegisterTokenRequest,
    responses(
        (status = 200, description = "Token accepted", body = MessageResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register_token(
    State(state): State<AppState>,
    handle: SessionHandle,
    ValidatedJson(req): ValidatedJson<RegisterTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut slot = handle.lock().await;
    let bound = state
        .authenticator
        .set_register_token(&mut slot.session, &req.token)
        .await?;

    if !bound {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Unknown registration token"
        )));
    }
    slot.rotate_id();
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Registration token accepted")),
    ))
}
