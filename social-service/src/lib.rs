pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::config::SocialConfig;
use crate::middleware::{metrics_middleware, session_middleware, CSRF_HEADER};
use crate::services::{
    AdapterRegistry, ForgeryGuard, RelationshipService, SessionAuthenticator, SessionStore,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::session::login,
        handlers::auth::session::logout,
        handlers::auth::session::me,
        handlers::auth::session::csrf_token,
        handlers::auth::registration::register,
        handlers::auth::registration::register_token,
        handlers::relationships::view_relationship,
        handlers::relationships::request_link,
        handlers::relationships::accept_link,
        handlers::relationships::reject_link,
        handlers::relationships::unlink,
        handlers::relationships::block,
        handlers::relationships::unblock,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::RegisterTokenRequest,
            dtos::auth::MeResponse,
            dtos::auth::CsrfResponse,
            dtos::relationships::RelationshipResponse,
        )
    ),
    tags(
        (name = "Authentication", description = "Session login, logout and registration"),
        (name = "Relationships", description = "Friend requests, friendships and blocks"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: SocialConfig,
    pub relationships: RelationshipService,
    pub authenticator: SessionAuthenticator,
    pub adapters: AdapterRegistry,
    pub forgery_guard: ForgeryGuard,
    pub sessions: Arc<dyn SessionStore>,
    pub login_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let session_layer = from_fn_with_state(state.clone(), session_middleware);

    // Credential submission is rate limited before any session work
    let login_limiter = state.login_rate_limiter.clone();
    let credential_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/register", post(handlers::auth::register))
        .layer(session_layer.clone())
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let session_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/csrf", get(handlers::auth::csrf_token))
        .route(
            "/auth/register/token",
            post(handlers::auth::register_token),
        )
        .route(
            "/relationships/:other",
            get(handlers::relationships::view_relationship),
        )
        .route(
            "/relationships/:other/request",
            post(handlers::relationships::request_link),
        )
        .route(
            "/relationships/:other/accept",
            post(handlers::relationships::accept_link),
        )
        .route(
            "/relationships/:other/reject",
            post(handlers::relationships::reject_link),
        )
        .route(
            "/relationships/:other/unlink",
            post(handlers::relationships::unlink),
        )
        .route(
            "/relationships/:other/block",
            post(handlers::relationships::block),
        )
        .route(
            "/relationships/:other/unblock",
            post(handlers::relationships::unblock),
        )
        .layer(session_layer);

    let allowed_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(credential_routes)
        .merge(session_routes)
        .with_state(state.clone())
        // Add metrics middleware
        .layer(from_fn(metrics_middleware))
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Session cookies need credentialed CORS, so origins are never wildcarded
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    HeaderName::from_static(CSRF_HEADER),
                    HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .relationships
        .store()
        .health_check()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Relationship store health check failed");
            AppError::ServiceUnavailable
        })?;

    state
        .authenticator
        .vault()
        .store()
        .health_check()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Credential store health check failed");
            AppError::ServiceUnavailable
        })?;

    state.sessions.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Session store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "relationships": "up",
            "credentials": "up",
            "sessions": "up"
        }
    })))
}
