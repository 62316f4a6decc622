//! Store-level isolation and lifecycle tests on in-memory SQLite.

use chrono::{Duration, Utc};
use uuid::Uuid;

use portal_db::entities::catalog_config::{self, catalog_type};
use portal_db::entities::{audit_log, catalog_server, session};
use portal_db::repos::{self, Page};
use portal_db::{DbHandle, StoreError};
use portal_security::{AccessScope, Role};

async fn handle() -> DbHandle {
    DbHandle::connect("sqlite::memory:")
        .await
        .expect("in-memory database")
}

fn catalog(
    name: &str,
    catalog_type_: &str,
    tenant: Option<Uuid>,
    owner: Option<Uuid>,
    precedence: i32,
) -> catalog_config::Model {
    let now = Utc::now();
    catalog_config::Model {
        id: Uuid::new_v4(),
        catalog_type: catalog_type_.to_owned(),
        name: name.to_owned(),
        display_name: name.to_owned(),
        description: String::new(),
        owner_id: owner,
        tenant_id: tenant,
        enabled: true,
        is_mandatory: false,
        precedence,
        version: "1".to_owned(),
        source_url: None,
        created_at: now,
        updated_at: now,
    }
}

fn server(catalog_id: Uuid, name: &str, position: i32) -> catalog_server::Model {
    let now = Utc::now();
    catalog_server::Model {
        id: Uuid::new_v4(),
        catalog_id,
        name: name.to_owned(),
        display_name: name.to_owned(),
        description: String::new(),
        image: format!("mcp/{name}"),
        tag: "latest".to_owned(),
        env: serde_json::json!({}),
        volumes: serde_json::json!([]),
        ports: serde_json::json!([]),
        command: serde_json::json!([]),
        enabled: true,
        is_override: false,
        overrides_server: None,
        position,
        created_at: now,
        updated_at: now,
    }
}

fn session_row(user: Uuid, tenant: Uuid, ttl_secs: i64) -> session::Model {
    let now = Utc::now();
    session::Model {
        id: format!("sess-{}", Uuid::new_v4().simple()),
        user_id: user,
        tenant_id: tenant,
        created_at: now,
        expires_at: now + Duration::seconds(ttl_secs),
        last_activity: now,
        remote_addr: None,
        user_agent: None,
        active: true,
        metadata: serde_json::json!({}),
    }
}

#[tokio::test]
async fn customizations_are_isolated_between_users() {
    let db = handle().await;
    let tenant = Uuid::new_v4();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let base = repos::catalogs::insert(
        db.conn(),
        catalog("base", catalog_type::ADMIN_BASE, Some(tenant), None, 100),
    )
    .await
    .unwrap();

    let alice_scope = AccessScope::new(tenant, alice, Role::User);
    let bob_scope = AccessScope::new(tenant, bob, Role::User);

    repos::customizations::upsert(db.conn(), &alice_scope, base.id, "github", "disable", None)
        .await
        .unwrap();

    // Bob's scope sees nothing of Alice's rows.
    assert!(
        repos::customizations::list(db.conn(), &bob_scope)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        repos::customizations::get(db.conn(), &bob_scope, base.id, "github")
            .await
            .unwrap()
            .is_none()
    );

    // A tenant admin sees the tenant's rows.
    let admin_scope = AccessScope::new(tenant, Uuid::new_v4(), Role::Admin);
    assert_eq!(
        repos::customizations::list(db.conn(), &admin_scope)
            .await
            .unwrap()
            .len(),
        1
    );

    // An admin of another tenant sees nothing.
    let foreign_admin = AccessScope::new(Uuid::new_v4(), Uuid::new_v4(), Role::Admin);
    assert!(
        repos::customizations::list(db.conn(), &foreign_admin)
            .await
            .unwrap()
            .is_empty()
    );

    // A super admin crosses tenants.
    let root = AccessScope::new(Uuid::new_v4(), Uuid::new_v4(), Role::SuperAdmin);
    assert_eq!(
        repos::customizations::list(db.conn(), &root).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn session_lifecycle_round_trips() {
    let db = handle().await;
    let user = Uuid::new_v4();
    let tenant = Uuid::new_v4();

    let created = repos::sessions::insert(db.conn(), session_row(user, tenant, 3600))
        .await
        .unwrap();

    let fetched = repos::sessions::get(db.conn(), &created.id).await.unwrap();
    assert!(fetched.is_some());

    // Refresh never regresses the expiry.
    let now = Utc::now();
    let shorter = now + Duration::seconds(10);
    let refreshed = repos::sessions::refresh(db.conn(), &created.id, shorter, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.expires_at, created.expires_at);

    let longer = now + Duration::seconds(7200);
    let refreshed = repos::sessions::refresh(db.conn(), &created.id, longer, now)
        .await
        .unwrap()
        .unwrap();
    assert!(refreshed.expires_at > created.expires_at);

    assert!(repos::sessions::delete(db.conn(), &created.id).await.unwrap());
    assert!(
        repos::sessions::get(db.conn(), &created.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn expired_sessions_are_swept() {
    let db = handle().await;
    let user = Uuid::new_v4();
    let tenant = Uuid::new_v4();

    repos::sessions::insert(db.conn(), session_row(user, tenant, -10))
        .await
        .unwrap();
    repos::sessions::insert(db.conn(), session_row(user, tenant, 3600))
        .await
        .unwrap();

    let swept = repos::sessions::delete_expired(db.conn(), Utc::now()).await.unwrap();
    assert_eq!(swept, 1);
    assert_eq!(repos::sessions::count_by_user(db.conn(), user).await.unwrap(), 1);
}

#[tokio::test]
async fn unowned_catalog_names_are_unique() {
    let db = handle().await;
    let tenant = Uuid::new_v4();

    repos::catalogs::insert(
        db.conn(),
        catalog("base", catalog_type::ADMIN_BASE, Some(tenant), None, 100),
    )
    .await
    .unwrap();

    let err = repos::catalogs::insert(
        db.conn(),
        catalog("base", catalog_type::SYSTEM_DEFAULT, None, None, 50),
    )
    .await
    .expect_err("duplicate unowned name must conflict");
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn base_catalog_query_scopes_by_tenant_and_includes_system() {
    let db = handle().await;
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();

    repos::catalogs::insert(
        db.conn(),
        catalog("a-base", catalog_type::ADMIN_BASE, Some(tenant_a), None, 100),
    )
    .await
    .unwrap();
    repos::catalogs::insert(
        db.conn(),
        catalog("b-base", catalog_type::ADMIN_BASE, Some(tenant_b), None, 100),
    )
    .await
    .unwrap();
    repos::catalogs::insert(
        db.conn(),
        catalog("global", catalog_type::SYSTEM_DEFAULT, None, None, 200),
    )
    .await
    .unwrap();
    // Disabled catalogs never take part in resolution.
    let mut disabled = catalog("a-off", catalog_type::ADMIN_BASE, Some(tenant_a), None, 10);
    disabled.enabled = false;
    repos::catalogs::insert(db.conn(), disabled).await.unwrap();

    let names: Vec<String> = repos::catalogs::enabled_base_catalogs(db.conn(), tenant_a)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["a-base".to_owned(), "global".to_owned()]);
}

#[tokio::test]
async fn server_upsert_replaces_by_name() {
    let db = handle().await;
    let tenant = Uuid::new_v4();
    let base = repos::catalogs::insert(
        db.conn(),
        catalog("base", catalog_type::ADMIN_BASE, Some(tenant), None, 100),
    )
    .await
    .unwrap();

    repos::catalogs::upsert_server(db.conn(), server(base.id, "github", 0))
        .await
        .unwrap();
    let mut replacement = server(base.id, "github", 0);
    replacement.tag = "v2".to_owned();
    repos::catalogs::upsert_server(db.conn(), replacement).await.unwrap();

    let servers = repos::catalogs::servers_of(db.conn(), base.id).await.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].tag, "v2");
}

#[tokio::test]
async fn audit_queries_respect_scope() {
    let db = handle().await;
    let tenant = Uuid::new_v4();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    for (user, request) in [(alice, "r1"), (bob, "r2")] {
        repos::audit::append(
            db.conn(),
            audit_log::Model {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                event_type: "execution".to_owned(),
                severity: "info".to_owned(),
                user_id: user,
                tenant_id: tenant,
                request_id: request.to_owned(),
                intent: Some("server.enable".to_owned()),
                args: serde_json::json!(["github"]),
                remote_addr: None,
                user_agent: None,
                success: true,
                error: None,
                duration_ms: Some(5),
                metadata: serde_json::json!({}),
            },
        )
        .await
        .unwrap();
    }

    let alice_scope = AccessScope::new(tenant, alice, Role::User);
    let mine = repos::audit::query(
        db.conn(),
        &alice_scope,
        &repos::audit::AuditFilter::default(),
        Page::default(),
    )
    .await
    .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id, alice);

    let admin_scope = AccessScope::new(tenant, Uuid::new_v4(), Role::Admin);
    let all = repos::audit::query(
        db.conn(),
        &admin_scope,
        &repos::audit::AuditFilter::default(),
        Page::default(),
    )
    .await
    .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn transaction_retry_commits_once() {
    let db = handle().await;
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();
    let scope = AccessScope::new(tenant, user, Role::User);
    let base = repos::catalogs::insert(
        db.conn(),
        catalog("base", catalog_type::ADMIN_BASE, Some(tenant), None, 100),
    )
    .await
    .unwrap();
    let base_id = base.id;

    db.transaction_with_retry(3, move |txn| {
        let scope = scope;
        Box::pin(async move {
            repos::customizations::upsert(txn, &scope, base_id, "github", "disable", None).await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    assert_eq!(
        repos::customizations::list_for_owner(db.conn(), user)
            .await
            .unwrap()
            .len(),
        1
    );
}
