use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::AppState;
use crate::api::rest::dto::{HealthDto, VersionDto};
use crate::api::rest::envelope::ReqCtx;
use crate::api::rest::error::ApiError;
use crate::api::rest::middleware::CurrentIdentity;
use crate::api::rest::routes::ApiDoc;

pub async fn version(ctx: ReqCtx) -> Response {
    ctx.ok(VersionDto {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Service health: database connectivity plus a tool liveness probe.
pub async fn health(ctx: ReqCtx, State(state): State<AppState>) -> Response {
    let database = state.db.ping().await.is_ok();
    let executor = state.executor.health().await.is_ok();

    let dto = HealthDto {
        status: if database && executor { "ok" } else { "degraded" },
        database,
        executor,
    };

    if database {
        ctx.ok(dto)
    } else {
        ctx.fail(
            ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "DEPENDENCY_UNAVAILABLE",
                "a required dependency is unreachable",
            )
            .with_details(serde_json::json!({
                "database": database,
                "executor": executor,
            })),
        )
    }
}

/// The caller's own rate-limit status.
pub async fn rate_limit_status(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    ctx.ok(state.executor.rate_limit_status(identity.id))
}

pub async fn openapi() -> Response {
    use utoipa::OpenApi as _;
    Json(ApiDoc::openapi()).into_response()
}
