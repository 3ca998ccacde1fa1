//! Friendship endpoints. Every state change needs an authenticated session
//! and a fresh anti-forgery token.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{relationships::RelationshipResponse, ErrorResponse},
    middleware::{AuthenticatedMember, CsrfVerified},
    models::Identity,
    AppState,
};

fn target(raw: String) -> Result<Identity, AppError> {
    Identity::parse(raw).map_err(AppError::from)
}

async fn respond(
    state: &AppState,
    actor: &Identity,
    other: Identity,
) -> Result<Json<RelationshipResponse>, AppError> {
    let view = state.relationships.view(actor, &other).await?;
    Ok(Json(RelationshipResponse {
        other: other.into_string(),
        view,
    }))
}

/// Relationship with another member as the caller sees it
#[utoipa::path(
    get,
    path = "/relationships/{other}",
    params(("other" = String, Path, description = "Other member identity")),
    responses(
        (status = 200, description = "Current relationship", body = RelationshipResponse),
        (status = 400, description = "Invalid target", body = ErrorResponse),
        (status = 401, description = "Login required", body = ErrorResponse)
    ),
    tag = "Relationships"
)]
pub async fn view_relationship(
    State(state): State<AppState>,
    AuthenticatedMember(actor): AuthenticatedMember,
    Path(other): Path<String>,
) -> Result<Json<RelationshipResponse>, AppError> {
    respond(&state, &actor, target(other)?).await
}

/// Send a friend request
#[utoipa::path(
    post,
    path = "/relationships/{other}/request",
    params(("other" = String, Path, description = "Other member identity")),
    responses(
        (status = 200, description = "Request recorded", body = RelationshipResponse),
        (status = 403, description = "Blocked or forgery check failed", body = ErrorResponse),
        (status = 409, description = "Already friends or pending", body = ErrorResponse)
    ),
    tag = "Relationships"
)]
pub async fn request_link(
    State(state): State<AppState>,
    _csrf: CsrfVerified,
    AuthenticatedMember(actor): AuthenticatedMember,
    Path(other): Path<String>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let other = target(other)?;
    state.relationships.request_link(&actor, &other).await?;
    respond(&state, &actor, other).await
}

/// Accept a pending friend request from `other`
#[utoipa::path(
    post,
    path = "/relationships/{other}/accept",
    params(("other" = String, Path, description = "Other member identity")),
    responses(
        (status = 200, description = "Now friends", body = RelationshipResponse),
        (status = 404, description = "No pending request", body = ErrorResponse)
    ),
    tag = "Relationships"
)]
pub async fn accept_link(
    State(state): State<AppState>,
    _csrf: CsrfVerified,
    AuthenticatedMember(actor): AuthenticatedMember,
    Path(other): Path<String>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let other = target(other)?;
    state.relationships.accept_link(&actor, &other).await?;
    respond(&state, &actor, other).await
}

/// Reject a pending friend request from `other`
#[utoipa::path(
    post,
    path = "/relationships/{other}/reject",
    params(("other" = String, Path, description = "Other member identity")),
    responses(
        (status = 200, description = "Request rejected", body = RelationshipResponse)
    ),
    tag = "Relationships"
)]
pub async fn reject_link(
    State(state): State<AppState>,
    _csrf: CsrfVerified,
    AuthenticatedMember(actor): AuthenticatedMember,
    Path(other): Path<String>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let other = target(other)?;
    state.relationships.reject_link(&actor, &other).await?;
    respond(&state, &actor, other).await
}

/// End a friendship
#[utoipa::path(
    post,
    path = "/relationships/{other}/unlink",
    params(("other" = String, Path, description = "Other member identity")),
    responses(
        (status = 200, description = "Friendship ended", body = RelationshipResponse),
        (status = 409, description = "Not friends", body = ErrorResponse)
    ),
    tag = "Relationships"
)]
pub async fn unlink(
    State(state): State<AppState>,
    _csrf: CsrfVerified,
    AuthenticatedMember(actor): AuthenticatedMember,
    Path(other): Path<String>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let other = target(other)?;
    state.relationships.unlink(&actor, &other).await?;
    respond(&state, &actor, other).await
}

/// Block `other`, ending any friendship or pending request
#[utoipa::path(
    post,
    path = "/relationships/{other}/block",
    params(("other" = String, Path, description = "Other member identity")),
    responses(
        (status = 200, description = "Member blocked", body = RelationshipResponse)
    ),
    tag = "Relationships"
)]
pub async fn block(
    State(state): State<AppState>,
    _csrf: CsrfVerified,
    AuthenticatedMember(actor): AuthenticatedMember,
    Path(other): Path<String>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let other = target(other)?;
    state.relationships.block(&actor, &other).await?;
    respond(&state, &actor, other).await
}

/// Lift a block placed by the caller
#[utoipa::path(
    post,
    path = "/relationships/{other}/unblock",
    params(("other" = String, Path, description = "Other member identity")),
    responses(
        (status = 200, description = "Block lifted", body = RelationshipResponse)
    ),
    tag = "Relationships"
)]
pub async fn unblock(
    State(state): State<AppState>,
    _csrf: CsrfVerified,
    AuthenticatedMember(actor): AuthenticatedMember,
    Path(other): Path<String>,
) -> Result<Json<RelationshipResponse>, AppError> {
    let other = target(other)?;
    state.relationships.unblock(&actor, &other).await?;
    respond(&state, &actor, other).await
}
