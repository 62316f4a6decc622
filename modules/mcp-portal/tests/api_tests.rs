//! End-to-end scenarios through the HTTP router, on in-memory SQLite with
//! `/bin/echo` standing in for the container tool.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode, header};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

use mcp_portal::config::{PortalConfig, StaticUser};
use mcp_portal::{AppState, build};
use portal_db::DbHandle;

const TENANT: &str = "11111111-2222-3333-4444-555555555555";

fn static_user(token: &str, subject: &str, groups: &[&str]) -> StaticUser {
    StaticUser {
        token: token.to_owned(),
        subject: subject.to_owned(),
        email: format!("{subject}@example.com"),
        display_name: subject.to_owned(),
        tenant_id: TENANT.parse().unwrap(),
        groups: groups.iter().map(|g| (*g).to_owned()).collect(),
    }
}

async fn test_app() -> (AppState, Router) {
    let db = DbHandle::connect("sqlite::memory:").await.expect("db");
    let mut cfg = PortalConfig::default();
    cfg.database.dsn = "sqlite::memory:".to_owned();
    cfg.executor.program = "/bin/echo".to_owned();
    cfg.executor.base_args = vec!["mcp".to_owned()];
    cfg.auth.static_users = vec![
        static_user("alice-token", "alice", &["users"]),
        static_user("admin-token", "root", &["administrators"]),
    ];
    let cancel = CancellationToken::new();
    let state = build(cfg, db, &cancel);
    let router = mcp_portal::api::rest::router(state.clone());
    (state, router)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    (status, body_json(response).await)
}

fn get(path: &str, session: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {session}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(path: &str, session: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(session) = session {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {session}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn put_json(path: &str, session: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {session}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(path: &str, session: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {session}"))
        .body(Body::empty())
        .unwrap()
}

async fn login(router: &Router, token: &str) -> String {
    let (status, body) = send(
        router,
        post_json("/auth/login", None, serde_json::json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    assert_eq!(body["success"], true);
    body["data"]["session_id"].as_str().unwrap().to_owned()
}

/// Seed one base catalog with servers through the admin API; returns the
/// catalog ID.
async fn seed_base_catalog(
    router: &Router,
    admin: &str,
    name: &str,
    mandatory: bool,
    servers: &[&str],
) -> Uuid {
    let (status, body) = send(
        router,
        post_json(
            "/admin/catalogs",
            Some(admin),
            serde_json::json!({
                "catalog_type": "admin_base",
                "name": name,
                "is_mandatory": mandatory,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "catalog create failed: {body}");
    let id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();

    for server in servers {
        let (status, body) = send(
            router,
            put_json(
                &format!("/admin/catalogs/{id}/servers"),
                admin,
                serde_json::json!({
                    "name": server,
                    "image": format!("mcp/{server}"),
                    "tag": "1",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "server upsert failed: {body}");
    }
    id
}

#[tokio::test]
async fn unauthenticated_requests_get_401_envelopes() {
    let (_state, router) = test_app().await;
    let (status, body) = send(
        &router,
        Request::builder().uri("/servers").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn health_and_version_are_public() {
    let (_state, router) = test_app().await;
    let (status, body) = send(
        &router,
        Request::builder().uri("/version").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "mcp-portal");

    let (status, body) = send(
        &router,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], true);
}

#[tokio::test]
async fn happy_enable_flows_end_to_end() {
    let (_state, router) = test_app().await;
    let admin = login(&router, "admin-token").await;
    seed_base_catalog(&router, &admin, "base1", false, &["github"]).await;

    let alice = login(&router, "alice-token").await;
    let (status, body) = send(&router, post_json("/servers/github/enable", Some(&alice), serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::OK, "enable failed: {body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["enabled"], true);

    // The audit sink is asynchronous; give the writer a moment.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let (status, body) = send(
        &router,
        get("/admin/audit?event_type=execution", &admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = body["data"].as_array().unwrap();
    let record = records
        .iter()
        .find(|r| r["intent"] == "server.enable")
        .expect("execution audit record");
    assert_eq!(record["args"], serde_json::json!(["github"]));
    assert_eq!(record["success"], true);
}

#[tokio::test]
async fn unknown_server_is_not_found() {
    let (_state, router) = test_app().await;
    let admin = login(&router, "admin-token").await;
    seed_base_catalog(&router, &admin, "base1", false, &["github"]).await;
    let alice = login(&router, "alice-token").await;

    let (status, body) = send(
        &router,
        post_json("/servers/ghost/enable", Some(&alice), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn dangerous_path_argument_is_rejected_without_spawn() {
    let (_state, router) = test_app().await;
    let admin = login(&router, "admin-token").await;
    seed_base_catalog(&router, &admin, "base1", false, &["github"]).await;
    let alice = login(&router, "alice-token").await;

    // The path segment decodes to `github; rm -rf /`.
    let (status, body) = send(
        &router,
        post_json(
            "/servers/github;%20rm%20-rf%20%2F/enable",
            Some(&alice),
            serde_json::json!({}),
        ),
    )
    .await;
    // The name is not in the resolved catalog, so resolution rejects it
    // before the executor ever sees it.
    assert_eq!(status, StatusCode::NOT_FOUND, "body: {body}");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn gateway_run_requires_admin_role() {
    let (_state, router) = test_app().await;
    let alice = login(&router, "alice-token").await;
    let (status, body) = send(
        &router,
        post_json("/gateway/run", Some(&alice), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PRIVILEGES");
}

#[tokio::test]
async fn mandatory_catalog_disable_is_persisted_but_ineffective() {
    let (_state, router) = test_app().await;
    let admin = login(&router, "admin-token").await;
    let catalog_id =
        seed_base_catalog(&router, &admin, "base1", true, &["critical"]).await;
    let alice = login(&router, "alice-token").await;

    let (status, body) = send(
        &router,
        put_json(
            &format!("/customizations/{catalog_id}/critical"),
            &alice,
            serde_json::json!({ "action": "disable" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "customize failed: {body}");

    // The row exists...
    let (_, body) = send(&router, get("/customizations", &alice)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // ...but the resolved catalog still contains the server.
    let (_, body) = send(&router, get("/catalog", &alice)).await;
    assert!(body["data"]["servers"].get("critical").is_some());
    assert_eq!(body["data"]["disabled_count"], 0);
}

#[tokio::test]
async fn override_wins_in_resolution() {
    let (_state, router) = test_app().await;
    let admin = login(&router, "admin-token").await;
    let catalog_id = seed_base_catalog(&router, &admin, "base1", false, &["github"]).await;
    let alice = login(&router, "alice-token").await;

    let (status, _) = send(
        &router,
        put_json(
            &format!("/customizations/{catalog_id}/github"),
            &alice,
            serde_json::json!({
                "action": "override",
                "custom_data": { "image": "b", "tag": "2" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&router, get("/catalog", &alice)).await;
    let github = &body["data"]["servers"]["github"];
    assert_eq!(github["image"], "b");
    assert_eq!(github["tag"], "2");
    assert_eq!(github["source"], "user_override");

    // The admin's own view is untouched.
    let (_, body) = send(&router, get("/catalog", &admin)).await;
    assert_eq!(body["data"]["servers"]["github"]["image"], "mcp/github");
}

#[tokio::test]
async fn disable_then_undo_restores_resolution() {
    let (_state, router) = test_app().await;
    let admin = login(&router, "admin-token").await;
    let catalog_id = seed_base_catalog(&router, &admin, "base1", false, &["github"]).await;
    let alice = login(&router, "alice-token").await;

    let (_, before) = send(&router, get("/catalog", &alice)).await;

    let (status, _) = send(
        &router,
        put_json(
            &format!("/customizations/{catalog_id}/github"),
            &alice,
            serde_json::json!({ "action": "disable" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, during) = send(&router, get("/catalog", &alice)).await;
    assert!(during["data"]["servers"].get("github").is_none());
    assert!(
        during["data"]["disabled"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("github"))
    );

    let (status, _) = send(
        &router,
        delete(&format!("/customizations/{catalog_id}/github"), &alice),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = send(&router, get("/catalog", &alice)).await;
    assert_eq!(before["data"]["servers"], after["data"]["servers"]);
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let (_state, router) = test_app().await;
    let alice = login(&router, "alice-token").await;

    let (status, body) = send(&router, get("/auth/sessions", &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &router,
        post_json("/auth/refresh", Some(&alice), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["expires_at"].is_string());

    let (status, _) = send(
        &router,
        post_json("/auth/logout", Some(&alice), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, get("/auth/sessions", &alice)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn expired_session_reports_session_expired() {
    let (state, router) = test_app().await;
    let alice = login(&router, "alice-token").await;

    // Age the session out directly in the store.
    use sea_orm::{ActiveModelTrait, Set};
    let session = portal_db::repos::sessions::get(state.db.conn(), &alice)
        .await
        .unwrap()
        .unwrap();
    let mut active: portal_db::entities::session::ActiveModel = session.into();
    active.expires_at = Set(chrono::Utc::now() - chrono::Duration::seconds(5));
    active.update(state.db.conn()).await.unwrap();

    let (status, body) = send(&router, get("/servers", &alice)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "SESSION_EXPIRED");
}

#[tokio::test]
async fn admin_routes_are_gated() {
    let (_state, router) = test_app().await;
    let alice = login(&router, "alice-token").await;
    let (status, body) = send(&router, get("/admin/audit", &alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PRIVILEGES");
}

#[tokio::test]
async fn secret_management_is_admin_only() {
    let (_state, router) = test_app().await;
    let alice = login(&router, "alice-token").await;
    let admin = login(&router, "admin-token").await;

    let (status, _) = send(
        &router,
        put_json(
            "/admin/secrets/api-key",
            &alice,
            serde_json::json!({ "value": "hunter2" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &router,
        put_json(
            "/admin/secrets/api-key",
            &admin,
            serde_json::json!({ "value": "hunter2" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["data"]["success"], true);

    // The audit trail never carries the secret value.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let (_, body) = send(&router, get("/admin/audit", &admin)).await;
    let rendered = body.to_string();
    assert!(!rendered.contains("hunter2"), "secret leaked into audit");
}

#[tokio::test]
async fn rate_limit_status_reports_usage() {
    let (_state, router) = test_app().await;
    let admin = login(&router, "admin-token").await;
    seed_base_catalog(&router, &admin, "base1", false, &["github"]).await;
    let alice = login(&router, "alice-token").await;

    let _ = send(&router, post_json("/servers/github/enable", Some(&alice), serde_json::json!({}))).await;
    let (status, body) = send(&router, get("/ratelimit/status", &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["used"].as_u64().unwrap() >= 1);
    assert_eq!(body["data"]["is_blocked"], false);
}
