use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use cookie::Cookie;

use coursedesk_auth::{SessionError, SessionToken, validate_session};
use coursedesk_core::UserId;

use crate::app::AppState;
use crate::app::errors::ApiError;
use crate::context::IdentityContext;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Resolve the caller from its session and attach an [`IdentityContext`].
///
/// The user row is re-read on every request so role changes and deletions
/// apply immediately.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = authenticate(&state, req.headers()).await?;
    let user_id = ctx.user_id();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    response.extensions_mut().insert(user_id);
    Ok(response)
}

/// Look up the session named by `headers`.
///
/// Every reason the caller is not signed in surfaces as
/// [`ApiError::Unauthenticated`]; store failures pass through unchanged.
/// An expired session is deleted on sight.
pub(crate) async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<IdentityContext, ApiError> {
    let token = session_token(headers)
        .ok_or_else(|| ApiError::Unauthenticated("login required".to_string()))?;

    let session = state
        .store
        .get_session(token)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("unknown session".to_string()))?;
    if let Err(e) = validate_session(&session, Utc::now()) {
        if e == SessionError::Expired {
            state.store.delete_session(token).await?;
            tracing::debug!(user_id = %session.user_id, "expired session removed");
        }
        return Err(ApiError::Unauthenticated(e.to_string()));
    }

    let user = state
        .store
        .get_user(session.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("unknown session".to_string()))?;
    Ok(IdentityContext::new(user, token))
}

/// One structured event per request.
pub async fn request_log(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(req).await;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let caller = response.extensions().get::<UserId>().map(UserId::get);
    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        latency_ms,
        caller = ?caller,
        "request"
    );
    response
}

/// Bearer header first, then the session cookie.
fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    extract_bearer(headers)
        .or_else(|| extract_cookie(headers))
        .and_then(|raw| raw.parse().ok())
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_owned())
}

fn extract_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
}
