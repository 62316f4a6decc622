use axum::extract::{Path, State};
use axum::response::Response;

use portal_executor::CommandIntent;
use portal_security::Identity;

use crate::AppState;
use crate::api::rest::dto::{ExecSummaryDto, ServerActionResponse};
use crate::api::rest::envelope::ReqCtx;
use crate::api::rest::middleware::CurrentIdentity;

/// Attach the caller's remaining per-command budget, mirroring the
/// executor's bucket state.
fn with_rate_headers(
    mut response: Response,
    state: &AppState,
    identity: &Identity,
    intent: CommandIntent,
) -> Response {
    let (remaining, _reset) = state.executor.rate_limit_remaining(identity.id, intent);
    response
        .headers_mut()
        .insert("x-ratelimit-remaining", remaining.into());
    response
}

/// The caller's resolved server list.
pub async fn list_servers(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let result = state
        .servers
        .list(&identity)
        .await
        .map(|resolved| resolved.servers.values().cloned().collect::<Vec<_>>());
    ctx.respond(result)
}

/// Resolved entry plus the tool's view of it.
pub async fn inspect_server(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(name): Path<String>,
) -> Response {
    let meta = ctx.meta();
    let result = state
        .servers
        .inspect(&state.shutdown, &identity, &name, &meta)
        .await
        .map(|(entry, exec)| {
            serde_json::json!({
                "server": entry,
                "inspect": ExecSummaryDto::from(exec),
            })
        });
    ctx.respond(result)
}

pub async fn enable_server(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(name): Path<String>,
) -> Response {
    let meta = ctx.meta();
    let result = state
        .servers
        .enable(&state.shutdown, &identity, &name, &meta)
        .await
        .map(|exec| ServerActionResponse {
            enabled: exec.success,
            result: ExecSummaryDto::from(exec),
        });
    let response = ctx.respond(result);
    with_rate_headers(response, &state, &identity, CommandIntent::ServerEnable)
}

pub async fn disable_server(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(name): Path<String>,
) -> Response {
    let meta = ctx.meta();
    let result = state
        .servers
        .disable(&state.shutdown, &identity, &name, &meta)
        .await
        .map(|exec| ServerActionResponse {
            enabled: false,
            result: ExecSummaryDto::from(exec),
        });
    let response = ctx.respond(result);
    with_rate_headers(response, &state, &identity, CommandIntent::ServerDisable)
}
