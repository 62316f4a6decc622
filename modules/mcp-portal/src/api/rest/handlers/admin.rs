//! Admin surface: catalog CRUD, audit queries, rate-limit management and
//! identity administration. The whole subtree sits behind
//! [`crate::api::rest::middleware::require_admin`].

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use uuid::Uuid;

use portal_db::repos::{self, Page};
use portal_executor::CommandIntent;

use crate::AppState;
use crate::api::rest::dto::{
    AuditQuery, AuditRecordDto, CatalogCreateRequest, CatalogDetailDto, CatalogDto,
    CatalogServerDto, CatalogUpdateRequest, DeletedCount, ExecSummaryDto, IdentityDto, PageQuery,
    RoleUpdateRequest, ServerUpsertRequest,
};
use crate::api::rest::envelope::ReqCtx;
use crate::api::rest::middleware::CurrentIdentity;
use crate::domain::DomainError;
use crate::domain::catalog::new_catalog_model;
use crate::domain::servers::ServerService;

// ---- catalogs ------------------------------------------------------

pub async fn create_catalog(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<CatalogCreateRequest>,
) -> Response {
    let model = new_catalog_model(
        &body.catalog_type,
        &body.name,
        body.display_name.as_deref().unwrap_or(&body.name),
        body.description.as_deref().unwrap_or_default(),
        body.precedence,
        body.is_mandatory,
        body.source_url,
    );
    let result = state
        .catalog
        .create_catalog(&identity.scope(), model)
        .await
        .map(CatalogDto::from);
    ctx.respond(result)
}

pub async fn list_catalogs(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Query(page): Query<PageQuery>,
) -> Response {
    let result = state
        .catalog
        .list_catalogs(&identity.scope(), Page::new(page.offset, page.limit))
        .await
        .map(|catalogs| catalogs.into_iter().map(CatalogDto::from).collect::<Vec<_>>());
    ctx.respond(result)
}

pub async fn get_catalog(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Uuid>,
) -> Response {
    let result = state
        .catalog
        .get_catalog(&identity.scope(), id)
        .await
        .map(|(catalog, servers)| CatalogDetailDto {
            catalog: CatalogDto::from(catalog),
            servers: servers.into_iter().map(CatalogServerDto::from).collect(),
        });
    ctx.respond(result)
}

pub async fn update_catalog(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Uuid>,
    Json(body): Json<CatalogUpdateRequest>,
) -> Response {
    let scope = identity.scope();
    let result = async {
        let (mut model, _) = state.catalog.get_catalog(&scope, id).await?;
        if let Some(v) = body.display_name {
            model.display_name = v;
        }
        if let Some(v) = body.description {
            model.description = v;
        }
        if let Some(v) = body.enabled {
            model.enabled = v;
        }
        if let Some(v) = body.is_mandatory {
            model.is_mandatory = v;
        }
        if let Some(v) = body.precedence {
            model.precedence = v;
        }
        if let Some(v) = body.version {
            model.version = v;
        }
        if let Some(v) = body.source_url {
            model.source_url = Some(v);
        }
        let updated = state.catalog.update_catalog(&scope, model).await?;
        Ok::<_, DomainError>(CatalogDto::from(updated))
    }
    .await;
    ctx.respond(result)
}

pub async fn delete_catalog(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Uuid>,
) -> Response {
    let result = state
        .catalog
        .delete_catalog(&identity.scope(), id)
        .await
        .map(|()| DeletedCount { deleted: 1 });
    ctx.respond(result)
}

pub async fn upsert_catalog_server(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Uuid>,
    Json(body): Json<ServerUpsertRequest>,
) -> Response {
    let model = body.into_model(id);
    let result = state
        .catalog
        .upsert_server(&identity.scope(), id, model)
        .await
        .map(CatalogServerDto::from);
    ctx.respond(result)
}

pub async fn delete_catalog_server(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path((id, name)): Path<(Uuid, String)>,
) -> Response {
    let result = state
        .catalog
        .delete_server(&identity.scope(), id, &name)
        .await
        .map(|()| DeletedCount { deleted: 1 });
    ctx.respond(result)
}

/// Shell out to the tool to synchronize a catalog from its source URL.
pub async fn sync_catalog(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Uuid>,
) -> Response {
    let scope = identity.scope();
    let result = async {
        let (catalog, _) = state.catalog.get_catalog(&scope, id).await?;
        let mut args = vec![catalog.name.clone()];
        if let Some(source) = &catalog.source_url {
            args.push(source.clone());
        }
        let req = ServerService::plain_request(
            &identity,
            CommandIntent::CatalogSync,
            args,
            &ctx.meta(),
        );
        let exec = state.executor.execute(&state.shutdown, req).await?;
        Ok::<_, DomainError>(ExecSummaryDto::from(exec))
    }
    .await;
    ctx.respond(result)
}

// ---- tool config and secrets ---------------------------------------

async fn run_tool_intent(
    ctx: &ReqCtx,
    state: &AppState,
    identity: &portal_security::Identity,
    intent: CommandIntent,
    args: Vec<String>,
) -> Response {
    let req = ServerService::plain_request(identity, intent, args, &ctx.meta());
    let result = state
        .executor
        .execute(&state.shutdown, req)
        .await
        .map(ExecSummaryDto::from)
        .map_err(DomainError::from);
    ctx.respond(result)
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct ValueBody {
    pub value: String,
}

pub async fn read_config(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(key): Path<String>,
) -> Response {
    run_tool_intent(&ctx, &state, &identity, CommandIntent::ConfigRead, vec![key]).await
}

pub async fn write_config(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(key): Path<String>,
    Json(body): Json<ValueBody>,
) -> Response {
    run_tool_intent(
        &ctx,
        &state,
        &identity,
        CommandIntent::ConfigWrite,
        vec![key, body.value],
    )
    .await
}

pub async fn list_secrets(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    run_tool_intent(&ctx, &state, &identity, CommandIntent::SecretList, Vec::new()).await
}

pub async fn get_secret(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(name): Path<String>,
) -> Response {
    run_tool_intent(&ctx, &state, &identity, CommandIntent::SecretGet, vec![name]).await
}

pub async fn set_secret(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(name): Path<String>,
    Json(body): Json<ValueBody>,
) -> Response {
    run_tool_intent(
        &ctx,
        &state,
        &identity,
        CommandIntent::SecretSet,
        vec![name, body.value],
    )
    .await
}

pub async fn delete_secret(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(name): Path<String>,
) -> Response {
    run_tool_intent(&ctx, &state, &identity, CommandIntent::SecretDelete, vec![name]).await
}

// ---- tool catalog store --------------------------------------------

pub async fn tool_catalog_init(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    run_tool_intent(&ctx, &state, &identity, CommandIntent::CatalogInit, Vec::new()).await
}

pub async fn tool_catalog_list(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    run_tool_intent(&ctx, &state, &identity, CommandIntent::CatalogList, Vec::new()).await
}

pub async fn tool_catalog_show(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(name): Path<String>,
) -> Response {
    run_tool_intent(&ctx, &state, &identity, CommandIntent::CatalogShow, vec![name]).await
}

// ---- audit ---------------------------------------------------------

pub async fn query_audit(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Query(query): Query<AuditQuery>,
) -> Response {
    let filter = repos::audit::AuditFilter {
        event_type: query.event_type,
        intent: query.intent,
        success: query.success,
    };
    let result = repos::audit::query(
        state.db.conn(),
        &identity.scope(),
        &filter,
        Page::new(query.offset, query.limit),
    )
    .await
    .map(|records| records.into_iter().map(AuditRecordDto::from).collect::<Vec<_>>())
    .map_err(DomainError::from);
    ctx.respond(result)
}

// ---- rate limits ---------------------------------------------------

pub async fn reset_rate_limit(
    ctx: ReqCtx,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Response {
    state.executor.limiter().reset(user_id);
    ctx.ok(serde_json::json!({ "reset": true }))
}

pub async fn user_rate_limit_status(
    ctx: ReqCtx,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Response {
    ctx.ok(state.executor.rate_limit_status(user_id))
}

// ---- identities ----------------------------------------------------

pub async fn list_identities(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Query(page): Query<PageQuery>,
) -> Response {
    let result = state
        .identity
        .list(&identity.scope(), Page::new(page.offset, page.limit))
        .await
        .map(|identities| {
            identities
                .into_iter()
                .map(IdentityDto::from)
                .collect::<Vec<_>>()
        });
    ctx.respond(result)
}

pub async fn update_identity_role(
    ctx: ReqCtx,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Uuid>,
    Json(body): Json<RoleUpdateRequest>,
) -> Response {
    let result = state
        .identity
        .update_role(&identity.scope(), id, body.role)
        .await
        .map(IdentityDto::from);
    ctx.respond(result)
}
