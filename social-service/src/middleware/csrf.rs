use axum::{extract::FromRequestParts, http::request::Parts};
use service_core::error::AppError;

use crate::{middleware::session::SessionHandle, AppState};

/// Header carrying the anti-forgery token on state-changing requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Proof that the request carried a valid, unused anti-forgery token for its
/// session. Take it as a handler argument to require the check.
#[derive(Debug, Clone, Copy)]
pub struct CsrfVerified;

#[axum::async_trait]
impl FromRequestParts<AppState> for CsrfVerified {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                tracing::warn!(path = %parts.uri.path(), "Missing anti-forgery token");
                AppError::Forbidden(anyhow::anyhow!("Missing anti-forgery token"))
            })?;

        let handle = SessionHandle::from_request_parts(parts, state).await?;
        let session_id = handle.lock().await.id.clone();

        state
            .forgery_guard
            .validate(&session_id, &token)
            .await
            .map_err(AppError::from)?;
        Ok(CsrfVerified)
    }
}
