//! Session authentication and coarse admission middleware.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use portal_security::{Identity, Role};

use crate::AppState;
use crate::api::rest::envelope::ReqCtx;
use crate::api::rest::error::ApiError;
use crate::domain::sessions::SessionLookup;

pub const SESSION_COOKIE: &str = "portal_session";

/// The authenticated identity, inserted by [`authenticate`].
#[derive(Clone, Debug)]
pub struct CurrentIdentity(pub Identity);

/// The session token the current request authenticated with.
#[derive(Clone, Debug)]
pub struct CurrentSessionId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CurrentIdentity {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<CurrentIdentity>() {
            return Ok(identity.clone());
        }
        let ctx = ReqCtx::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never| match never {});
        Err(ctx.fail(ApiError::unauthorized()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentSessionId {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<CurrentSessionId>() {
            return Ok(session.clone());
        }
        let ctx = ReqCtx::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never| match never {});
        Err(ctx.fail(ApiError::unauthorized()))
    }
}

/// Pull the session token from `Authorization: Bearer ...` or the session
/// cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_owned());
            }
        }
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let mut kv = pair.trim().splitn(2, '=');
        if kv.next() == Some(SESSION_COOKIE) {
            return kv.next().map(ToOwned::to_owned);
        }
    }
    None
}

/// Resolve the session token to an identity and stash both in request
/// extensions. A missing or unknown token and an expired session produce
/// distinct codes, but both are 401 and neither confirms existence.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = req_ctx(&request);

    let Some(token) = extract_token(request.headers()) else {
        return ctx.fail(ApiError::unauthorized());
    };

    let session = match state.sessions.get(&token).await {
        Ok(SessionLookup::Found(session)) => session,
        Ok(SessionLookup::Expired) => return ctx.fail(ApiError::session_expired()),
        Ok(SessionLookup::NotFound) => return ctx.fail(ApiError::unauthorized()),
        Err(e) => return ctx.fail(e.into()),
    };

    let identity = match state.identity.load_for_session(session.user_id).await {
        Ok(identity) => identity,
        // A session whose identity vanished is as good as no session.
        Err(_) => return ctx.fail(ApiError::unauthorized()),
    };

    request.extensions_mut().insert(CurrentIdentity(identity));
    request.extensions_mut().insert(CurrentSessionId(session.id));
    next.run(request).await
}

/// Gate a subtree on tenant-admin role. Runs after [`authenticate`].
pub async fn require_admin(request: Request, next: Next) -> Response {
    let ctx = req_ctx(&request);
    match request.extensions().get::<CurrentIdentity>() {
        Some(current) if current.0.role >= Role::Admin => next.run(request).await,
        Some(_) => ctx.fail(ApiError::new(
            StatusCode::FORBIDDEN,
            "INSUFFICIENT_PRIVILEGES",
            "administrator role required",
        )),
        None => ctx.fail(ApiError::unauthorized()),
    }
}

/// Whole-service requests-per-second gate. Returns a bare 429 like any
/// front proxy would; the per-user limiter downstream gives the rich
/// envelope.
#[must_use]
pub fn global_rate_limiter(rps: u32, burst: u32) -> Option<Arc<DefaultDirectRateLimiter>> {
    let rps = NonZeroU32::new(rps)?;
    let burst = NonZeroU32::new(burst.max(rps.get()))?;
    Some(Arc::new(RateLimiter::direct(
        Quota::per_second(rps).allow_burst(burst),
    )))
}

fn req_ctx(request: &Request) -> ReqCtx {
    let request_id = request
        .headers()
        .get(crate::api::rest::envelope::REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToOwned::to_owned);
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    ReqCtx {
        request_id,
        remote_addr: None,
        user_agent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        headers.insert(
            header::COOKIE,
            format!("{SESSION_COOKIE}=cookie-token").parse().unwrap(),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_is_used_when_no_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; {SESSION_COOKIE}=cookie-token; lang=en")
                .parse()
                .unwrap(),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn no_credentials_is_none() {
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }
}
