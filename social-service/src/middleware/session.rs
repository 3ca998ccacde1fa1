use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    models::{Identity, RememberCookie, Session, SessionId},
    services::{bounded, ServiceError},
    AppState,
};

pub const SESSION_COOKIE: &str = "sid";

const STORE: &str = "session";

/// Session loaded for the current request plus what to send back.
#[derive(Debug)]
pub struct SessionSlot {
    pub id: SessionId,
    pub session: Session,
    /// Request host, used to name the remember cookie.
    pub host: String,
    previous_id: Option<SessionId>,
    issue_cookie: bool,
    remember_cookies: Vec<RememberCookie>,
}

impl SessionSlot {
    fn new(id: SessionId, session: Session, host: String, issue_cookie: bool) -> Self {
        Self {
            id,
            session,
            host,
            previous_id: None,
            issue_cookie,
            remember_cookies: Vec::new(),
        }
    }

    /// Move the session to a fresh id, e.g. after a privilege change.
    pub fn rotate_id(&mut self) {
        let old = std::mem::replace(&mut self.id, SessionId::generate());
        self.previous_id.get_or_insert(old);
        self.issue_cookie = true;
    }

    /// Queue a remember cookie (issue or removal) for the response.
    pub fn push_remember_cookie(&mut self, cookie: RememberCookie) {
        self.remember_cookies.retain(|c| c.name != cookie.name);
        self.remember_cookies.push(cookie);
    }
}

/// Shared handle to the request's [`SessionSlot`].
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<Mutex<SessionSlot>>);

impl SessionHandle {
    pub async fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.0.lock().await
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<SessionHandle>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Session missing from request extensions"))
        })
    }
}

/// Identity of an authenticated session; rejects anonymous callers with 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedMember(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedMember
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let handle = SessionHandle::from_request_parts(parts, state).await?;
        let slot = handle.lock().await;
        match (&slot.session.identity, slot.session.is_authenticated()) {
            (Some(identity), true) => Ok(AuthenticatedMember(identity.clone())),
            _ => Err(AppError::Unauthorized(anyhow::anyhow!("Login required"))),
        }
    }
}

fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.to_ascii_lowercase())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Load the session from its cookie, fall back to the remember cookie for
/// anonymous sessions, and persist the session after the handler ran.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let jar = CookieJar::from_headers(req.headers());
    let host = request_host(req.headers());

    let timeout = state.config.session.store_timeout();

    let existing = match jar.get(SESSION_COOKIE).and_then(|c| SessionId::parse(c.value())) {
        Some(id) => bounded(timeout, STORE, state.sessions.load(&id))
            .await?
            .map(|session| (id, session)),
        None => None,
    };
    let mut slot = match existing {
        Some((id, session)) => SessionSlot::new(id, session, host, false),
        None => SessionSlot::new(SessionId::generate(), Session::default(), host, true),
    };

    if slot.session.identity.is_none() {
        let remember_name = RememberCookie::cookie_name(&slot.host);
        if let Some(raw) = jar.get(&remember_name).map(|c| c.value().to_string()) {
            if !raw.is_empty() {
                restore_from_remember_cookie(&state, &mut slot, &raw).await;
            }
        }
    }

    let handle = SessionHandle(Arc::new(Mutex::new(slot)));
    req.extensions_mut().insert(handle.clone());

    let mut response = next.run(req).await;

    let slot = handle.lock().await;
    if let Some(old) = slot.previous_id.as_ref() {
        bounded(timeout, STORE, state.sessions.delete(old)).await?;
    }
    let ttl = state.config.session.session_ttl();
    bounded(timeout, STORE, state.sessions.save(&slot.id, &slot.session, ttl)).await?;

    let secure = state.config.security.secure_cookies;
    if slot.issue_cookie {
        let cookie = Cookie::build((SESSION_COOKIE, slot.id.as_str().to_string()))
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .build();
        append_cookie(&mut response, &cookie);
    }
    for remember in &slot.remember_cookies {
        append_cookie(&mut response, &remember_cookie(remember, secure));
    }

    Ok(response)
}

/// Silent re-login: bind the remembered identity, then confirm it. Failures
/// leave the session anonymous; an unusable token is also deleted client side.
async fn restore_from_remember_cookie(state: &AppState, slot: &mut SessionSlot, raw: &str) {
    let authenticator = &state.authenticator;
    match authenticator
        .resolve_from_remember_token(&mut slot.session, raw)
        .await
    {
        Ok(identity) => match authenticator.confirm(&mut slot.session).await {
            Ok(()) => {
                slot.rotate_id();
                tracing::info!(identity = %identity, "Session restored from remember token");
            }
            Err(ServiceError::Denied) => {
                let removal = RememberCookie::removal(&slot.host);
                slot.push_remember_cookie(removal);
            }
            Err(e) => {
                tracing::debug!(identity = %identity, error = %e, "Remembered member not confirmed");
            }
        },
        Err(ServiceError::Invalid) => {
            let removal = RememberCookie::removal(&slot.host);
            slot.push_remember_cookie(removal);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Remember token lookup failed");
        }
    }
}

fn remember_cookie(remember: &RememberCookie, secure: bool) -> Cookie<'static> {
    let expires = OffsetDateTime::from_unix_timestamp(remember.expires.timestamp())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    Cookie::build((remember.name.clone(), remember.value.clone()))
        .path(remember.path.clone())
        .http_only(remember.http_only)
        .secure(remember.secure && secure)
        .same_site(SameSite::Lax)
        .expires(expires)
        .build()
}

fn append_cookie(response: &mut Response, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!(cookie = %cookie.name(), error = %e, "Unencodable cookie"),
    }
}
