//! Router assembly: public surface, authenticated surface, admin subtree,
//! cross-cutting layers.

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::AppState;
use crate::api::rest::handlers::{admin, auth, catalog, gateway, servers, system};
use crate::api::rest::{dto, error, middleware as portal_middleware};

/// OpenAPI document for the DTO schemas.
#[derive(OpenApi)]
#[openapi(
    info(title = "MCP Portal API", description = "Multi-tenant MCP server management portal"),
    components(schemas(
        dto::LoginRequest,
        dto::LoginResponse,
        dto::IdentityDto,
        dto::SessionDto,
        dto::RefreshResponse,
        dto::DeletedCount,
        dto::ExecSummaryDto,
        dto::ServerActionResponse,
        dto::CustomizationRequest,
        dto::CustomizationDto,
        dto::CatalogCreateRequest,
        dto::CatalogUpdateRequest,
        dto::CatalogDto,
        dto::CatalogDetailDto,
        dto::ServerUpsertRequest,
        dto::CatalogServerDto,
        dto::AuditRecordDto,
        dto::RoleUpdateRequest,
        dto::VersionDto,
        dto::HealthDto,
        error::ErrorBody,
    ))
)]
pub struct ApiDoc;

/// Build the portal router.
#[must_use]
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(system::health))
        .route("/version", get(system::version))
        .route("/openapi.json", get(system::openapi))
        .route("/auth/login", post(auth::login));

    let admin_routes = Router::new()
        .route("/catalogs", get(admin::list_catalogs).post(admin::create_catalog))
        .route(
            "/catalogs/{id}",
            get(admin::get_catalog)
                .put(admin::update_catalog)
                .delete(admin::delete_catalog),
        )
        .route("/catalogs/{id}/servers", put(admin::upsert_catalog_server))
        .route(
            "/catalogs/{id}/servers/{name}",
            delete(admin::delete_catalog_server),
        )
        .route("/catalogs/{id}/sync", post(admin::sync_catalog))
        .route("/config/{key}", get(admin::read_config).put(admin::write_config))
        .route("/secrets", get(admin::list_secrets))
        .route(
            "/secrets/{name}",
            get(admin::get_secret)
                .put(admin::set_secret)
                .delete(admin::delete_secret),
        )
        .route("/tool/catalogs", get(admin::tool_catalog_list))
        .route("/tool/catalogs/init", post(admin::tool_catalog_init))
        .route("/tool/catalogs/{name}", get(admin::tool_catalog_show))
        .route("/audit", get(admin::query_audit))
        .route("/ratelimit/{user_id}", get(admin::user_rate_limit_status))
        .route("/ratelimit/{user_id}/reset", post(admin::reset_rate_limit))
        .route("/identities", get(admin::list_identities))
        .route("/identities/{id}/role", put(admin::update_identity_role))
        .route_layer(middleware::from_fn(portal_middleware::require_admin));

    let authenticated = Router::new()
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/auth/sessions",
            get(auth::list_sessions).delete(auth::delete_all_sessions),
        )
        .route("/auth/sessions/{id}", delete(auth::delete_session))
        .route("/catalog", get(catalog::resolved_catalog))
        .route(
            "/customizations",
            get(catalog::list_customizations),
        )
        .route(
            "/customizations/{catalog_id}/{server}",
            put(catalog::put_customization).delete(catalog::delete_customization),
        )
        .route("/servers", get(servers::list_servers))
        .route("/servers/{name}", get(servers::inspect_server))
        .route("/servers/{name}/enable", post(servers::enable_server))
        .route("/servers/{name}/disable", post(servers::disable_server))
        .route("/gateway/run", post(gateway::run))
        .route("/gateway/stop", post(gateway::stop))
        .route("/gateway/status", get(gateway::status))
        .route("/gateway/logs", get(gateway::logs))
        .route("/ratelimit/status", get(system::rate_limit_status))
        .nest("/admin", admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            portal_middleware::authenticate,
        ));

    let mut router = public.merge(authenticated);

    // Coarse whole-service gate, outermost of the app-specific layers.
    if let Some(limiter) = portal_middleware::global_rate_limiter(
        state.config.http.global_rps,
        state.config.http.global_burst,
    ) {
        router = router.layer(middleware::from_fn(move |req: Request, next: Next| {
            let limiter = limiter.clone();
            async move {
                if limiter.check().is_err() {
                    return StatusCode::TOO_MANY_REQUESTS.into_response();
                }
                next.run(req).await
            }
        }));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(state.config.http.body_limit))
        .layer(TimeoutLayer::new(state.config.http.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
