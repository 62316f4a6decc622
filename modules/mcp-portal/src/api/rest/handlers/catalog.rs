use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::AppState;
use crate::api::rest::dto::{CustomizationDto, CustomizationRequest, DeletedCount};
use crate::api::rest::envelope::ReqCtx;
use crate::api::rest::middleware::CurrentIdentity;
use crate::domain::DomainError;

/// The caller's fully resolved catalog.
pub async fn resolved_catalog(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let result = state.catalog.resolve(&identity.scope()).await;
    match result {
        Ok(resolved) => ctx.ok(&*resolved),
        Err(e) => ctx.fail(e.into()),
    }
}

/// The caller's customizations.
pub async fn list_customizations(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let result = state
        .catalog
        .list_customizations(&identity.scope())
        .await
        .map(|rows| rows.into_iter().map(CustomizationDto::from).collect::<Vec<_>>());
    ctx.respond(result)
}

/// Create or replace a customization for one base-catalog server.
pub async fn put_customization(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path((catalog_id, server)): Path<(Uuid, String)>,
    Json(body): Json<CustomizationRequest>,
) -> Response {
    let result = state
        .catalog
        .apply_customization(
            &identity.scope(),
            catalog_id,
            &server,
            body.action,
            body.custom_data,
        )
        .await
        .map(CustomizationDto::from);
    ctx.respond(result)
}

/// Remove a customization (undo disable/override/add).
pub async fn delete_customization(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path((catalog_id, server)): Path<(Uuid, String)>,
) -> Response {
    let result = state
        .catalog
        .remove_customization(&identity.scope(), catalog_id, &server)
        .await
        .and_then(|deleted| {
            if deleted {
                Ok(DeletedCount { deleted: 1 })
            } else {
                Err(DomainError::NotFound("customization"))
            }
        });
    ctx.respond(result)
}
