//! The portal module: domain services and the REST surface.
//!
//! Layout follows the usual split: [`domain`] holds the business logic
//! (sessions, catalog inheritance, server lifecycle), [`infra`] the
//! adapters (database audit sink, static claims verifier), [`api`] the
//! HTTP layer. [`config`] is the module's configuration section.

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use portal_db::DbHandle;
use portal_executor::{CliExecutor, RateLimiter, TracingAuditSink, Whitelist};

use crate::config::PortalConfig;
use crate::domain::catalog::CatalogService;
use crate::domain::identity::IdentityService;
use crate::domain::servers::ServerService;
use crate::domain::sessions::SessionService;
use crate::infra::audit::DbAuditSink;
use crate::infra::claims::{ClaimsVerifier, StaticClaimsVerifier};

/// Everything the HTTP layer needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PortalConfig>,
    pub db: DbHandle,
    pub executor: Arc<CliExecutor>,
    pub sessions: Arc<SessionService>,
    pub identity: Arc<IdentityService>,
    pub catalog: Arc<CatalogService>,
    pub servers: Arc<ServerService>,
    pub verifier: Arc<dyn ClaimsVerifier>,
    /// Child of the process shutdown token; cancels in-flight executions.
    pub shutdown: CancellationToken,
}

/// Wire the module: audit sink, executor, services, background sweepers.
///
/// The returned state drives [`api::rest::router`]; all background tasks
/// stop when `cancel` fires.
#[must_use]
pub fn build(config: PortalConfig, db: DbHandle, cancel: &CancellationToken) -> AppState {
    let config = Arc::new(config);

    let audit: Arc<dyn portal_executor::AuditSink> = if config.audit.persist {
        Arc::new(DbAuditSink::spawn(db.clone(), cancel.clone()))
    } else {
        Arc::new(TracingAuditSink)
    };

    let limiter = Arc::new(RateLimiter::new(config.executor.rate_limit.clone()));
    limiter.clone().spawn_block_sweeper(cancel.clone());

    let executor = Arc::new(CliExecutor::new(
        config.executor.clone(),
        Arc::new(Whitelist::builtin()),
        limiter,
        audit.clone(),
    ));

    let sessions = Arc::new(SessionService::new(db.clone(), config.auth.clone()));
    sessions.clone().spawn_sweeper(cancel.clone());

    let identity = Arc::new(IdentityService::new(db.clone()));
    let catalog = Arc::new(CatalogService::new(db.clone()));
    let servers = Arc::new(ServerService::new(
        db.clone(),
        executor.clone(),
        catalog.clone(),
    ));

    let verifier: Arc<dyn ClaimsVerifier> =
        Arc::new(StaticClaimsVerifier::new(&config.auth.static_users));

    AppState {
        config,
        db,
        executor,
        sessions,
        identity,
        catalog,
        servers,
        verifier,
        shutdown: cancel.child_token(),
    }
}
