//! Server lifecycle: the bridge between the resolved catalog and the
//! container tool.
//!
//! Enable/disable first confirm the server exists in the caller's resolved
//! view, then run exactly one whitelisted command, then persist the state
//! change and invalidate the caller's cached resolution.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use portal_db::DbHandle;
use portal_db::entities::catalog_server;
use portal_db::repos;
use portal_executor::{CliExecutor, CommandIntent, ExecRequest, ExecResult};
use portal_security::Identity;

use crate::domain::DomainError;
use crate::domain::catalog::{CatalogService, EntrySource, ResolvedServer};

/// Client metadata threaded from the HTTP layer into execution and audit.
#[derive(Clone, Debug, Default)]
pub struct RequestMeta {
    pub request_id: String,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

pub struct ServerService {
    db: DbHandle,
    executor: Arc<CliExecutor>,
    catalog: Arc<CatalogService>,
}

impl ServerService {
    #[must_use]
    pub fn new(db: DbHandle, executor: Arc<CliExecutor>, catalog: Arc<CatalogService>) -> Self {
        Self {
            db,
            executor,
            catalog,
        }
    }

    /// The caller's resolved view (names, sources, counters).
    pub async fn list(
        &self,
        identity: &Identity,
    ) -> Result<Arc<crate::domain::catalog::ResolvedCatalog>, DomainError> {
        self.catalog.resolve(&identity.scope()).await
    }

    /// Resolved entry plus the tool's own view of it.
    #[instrument(skip(self, cancel, identity, meta))]
    pub async fn inspect(
        &self,
        cancel: &CancellationToken,
        identity: &Identity,
        name: &str,
        meta: &RequestMeta,
    ) -> Result<(ResolvedServer, ExecResult), DomainError> {
        let entry = self.resolved_entry(identity, name).await?;
        let result = self
            .executor
            .execute(cancel, self.request(identity, CommandIntent::ServerInspect, name, meta))
            .await?;
        Ok((entry, result))
    }

    /// Enable a server from the caller's resolved catalog.
    #[instrument(skip(self, cancel, identity, meta))]
    pub async fn enable(
        &self,
        cancel: &CancellationToken,
        identity: &Identity,
        name: &str,
        meta: &RequestMeta,
    ) -> Result<ExecResult, DomainError> {
        let scope = identity.scope();
        // The name must exist in the resolved view, or be disabled there:
        // enabling an explicitly disabled entry is the undo path.
        let resolved = self.catalog.resolve(&scope).await?;
        let entry = resolved.servers.get(name).cloned();
        let was_disabled = resolved.disabled.contains(name);
        if entry.is_none() && !was_disabled {
            return Err(DomainError::NotFound("server"));
        }

        let result = self
            .executor
            .execute(cancel, self.request(identity, CommandIntent::ServerEnable, name, meta))
            .await?;

        if result.success {
            self.persist_enabled(&scope, entry.as_ref(), name, true).await?;
            self.catalog.invalidate_user(scope.user_id());
            info!(server = name, "server enabled");
        }
        Ok(result)
    }

    /// Disable a server from the caller's resolved catalog.
    #[instrument(skip(self, cancel, identity, meta))]
    pub async fn disable(
        &self,
        cancel: &CancellationToken,
        identity: &Identity,
        name: &str,
        meta: &RequestMeta,
    ) -> Result<ExecResult, DomainError> {
        let scope = identity.scope();
        let entry = self.resolved_entry(identity, name).await?;

        let result = self
            .executor
            .execute(cancel, self.request(identity, CommandIntent::ServerDisable, name, meta))
            .await?;

        if result.success {
            self.persist_enabled(&scope, Some(&entry), name, false).await?;
            self.catalog.invalidate_user(scope.user_id());
            info!(server = name, "server disabled");
        }
        Ok(result)
    }

    async fn resolved_entry(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<ResolvedServer, DomainError> {
        let resolved = self.catalog.resolve(&identity.scope()).await?;
        resolved
            .servers
            .get(name)
            .cloned()
            .ok_or(DomainError::NotFound("server"))
    }

    /// Persist an enabled/disabled state change.
    ///
    /// Entries from base catalogs toggle through a `disable` customization
    /// (created on disable, removed on enable). Entries the user owns
    /// (personal catalogs) flip the row's `enabled` flag directly.
    async fn persist_enabled(
        &self,
        scope: &portal_security::AccessScope,
        entry: Option<&ResolvedServer>,
        name: &str,
        enabled: bool,
    ) -> Result<(), DomainError> {
        match entry {
            Some(e) if e.source == EntrySource::UserPersonal => {
                let servers = repos::catalogs::servers_of(self.db.conn(), e.catalog_id).await?;
                if let Some(row) = servers.into_iter().find(|s| s.name == name) {
                    let updated = catalog_server::Model {
                        enabled,
                        updated_at: Utc::now(),
                        ..row
                    };
                    repos::catalogs::upsert_server(self.db.conn(), updated).await?;
                }
                Ok(())
            }
            Some(e) if !enabled => {
                repos::customizations::upsert(
                    self.db.conn(),
                    scope,
                    e.catalog_id,
                    name,
                    portal_db::entities::customization::action::DISABLE,
                    None,
                )
                .await?;
                Ok(())
            }
            _ => {
                // Enabling: drop any disable customization for this name,
                // wherever it points.
                let existing =
                    repos::customizations::list_for_owner(self.db.conn(), scope.user_id())
                        .await?;
                for custom in existing {
                    if custom.base_server_name == name
                        && custom.action
                            == portal_db::entities::customization::action::DISABLE
                    {
                        repos::customizations::delete(
                            self.db.conn(),
                            scope,
                            custom.base_catalog_id,
                            name,
                        )
                        .await?;
                    }
                }
                Ok(())
            }
        }
    }

    fn request(
        &self,
        identity: &Identity,
        intent: CommandIntent,
        name: &str,
        meta: &RequestMeta,
    ) -> ExecRequest {
        let mut req = ExecRequest::new(
            intent,
            identity.id,
            identity.role,
            identity.tenant_id,
            meta.request_id.clone(),
        )
        .with_args(vec![name.to_owned()]);
        req.remote_addr = meta.remote_addr.clone();
        req.user_agent = meta.user_agent.clone();
        req
    }

    /// Plain executor pass-through for gateway/catalog/config intents that
    /// take no catalog resolution.
    pub fn plain_request(
        identity: &Identity,
        intent: CommandIntent,
        args: Vec<String>,
        meta: &RequestMeta,
    ) -> ExecRequest {
        let mut req = ExecRequest::new(
            intent,
            identity.id,
            identity.role,
            identity.tenant_id,
            meta.request_id.clone(),
        )
        .with_args(args);
        req.remote_addr = meta.remote_addr.clone();
        req.user_agent = meta.user_agent.clone();
        req
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<CliExecutor> {
        &self.executor
    }
}
