use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;

use crate::AppState;
use crate::api::rest::dto::{
    DeletedCount, IdentityDto, LoginRequest, LoginResponse, RefreshResponse, SessionDto,
};
use crate::api::rest::envelope::ReqCtx;
use crate::api::rest::middleware::{CurrentIdentity, CurrentSessionId, SESSION_COOKIE};
use crate::domain::DomainError;

/// Exchange an identity-provider token for a portal session.
pub async fn login(
    ctx: ReqCtx,
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Response {
    let result = async {
        let claims = state.verifier.verify(&body.token).await?;
        let identity = state.identity.login(&claims).await?;
        let session = state
            .sessions
            .create(&identity, ctx.remote_addr.clone(), ctx.user_agent.clone())
            .await?;
        Ok::<_, DomainError>(LoginResponse {
            session_id: session.id,
            expires_at: session.expires_at,
            identity: IdentityDto::from(identity),
        })
    }
    .await;

    match result {
        Ok(login) => {
            let cookie = format!(
                "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Strict",
                login.session_id
            );
            let mut response = ctx.ok(&login);
            if let Ok(value) = cookie.parse() {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            response
        }
        Err(e) => ctx.fail(e.into()),
    }
}

/// Extend the current session by the configured TTL.
pub async fn refresh(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentSessionId(session_id): CurrentSessionId,
) -> Response {
    let result = state.sessions.refresh(&session_id).await.and_then(|s| {
        s.map(|session| RefreshResponse {
            expires_at: session.expires_at,
        })
        .ok_or(DomainError::NotFound("session"))
    });
    ctx.respond(result)
}

/// Revoke the session the request authenticated with.
pub async fn logout(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    CurrentSessionId(session_id): CurrentSessionId,
) -> Response {
    let result = state
        .sessions
        .delete(&identity.scope(), &session_id)
        .await
        .map(|deleted| DeletedCount {
            deleted: u64::from(deleted),
        });
    ctx.respond(result)
}

/// The caller's active sessions.
pub async fn list_sessions(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let result = state
        .sessions
        .list_by_user(&identity.scope(), identity.id)
        .await
        .map(|sessions| sessions.into_iter().map(SessionDto::from).collect::<Vec<_>>());
    ctx.respond(result)
}

/// Revoke one session by ID.
pub async fn delete_session(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(session_id): Path<String>,
) -> Response {
    let result = state
        .sessions
        .delete(&identity.scope(), &session_id)
        .await
        .and_then(|deleted| {
            if deleted {
                Ok(DeletedCount { deleted: 1 })
            } else {
                Err(DomainError::NotFound("session"))
            }
        });
    ctx.respond(result)
}

/// Revoke every session of the calling user.
pub async fn delete_all_sessions(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let result = state
        .sessions
        .delete_by_user(&identity.scope(), identity.id)
        .await
        .map(|deleted| DeletedCount { deleted });
    ctx.respond(result)
}
