//! Request/response DTOs. Entities never cross the HTTP boundary; these
//! types do.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use portal_db::entities::{audit_log, catalog_config, catalog_server, customization, session};
use portal_executor::ExecResult;
use portal_security::{Identity, Role};

use crate::domain::catalog::CustomizationAction;

// ---- auth ----------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Token for the identity-provider boundary (verified-claims seam).
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub identity: IdentityDto,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityDto {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub tenant_id: Uuid,
    #[schema(value_type = String)]
    pub role: Role,
}

impl From<Identity> for IdentityDto {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            display_name: identity.display_name,
            tenant_id: identity.tenant_id,
            role: identity.role,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDto {
    pub id: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl From<session::Model> for SessionDto {
    fn from(model: session::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            created_at: model.created_at,
            expires_at: model.expires_at,
            last_activity: model.last_activity,
            remote_addr: model.remote_addr,
            user_agent: model.user_agent,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedCount {
    pub deleted: u64,
}

// ---- execution -----------------------------------------------------

/// Trimmed execution result for API responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExecSummaryDto {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl From<ExecResult> for ExecSummaryDto {
    fn from(result: ExecResult) -> Self {
        Self {
            success: result.success,
            exit_code: result.exit_code,
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            stdout: result.stdout,
            stderr: result.stderr,
            error: result.error,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServerActionResponse {
    pub enabled: bool,
    pub result: ExecSummaryDto,
}

// ---- customizations ------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomizationRequest {
    #[schema(value_type = String)]
    pub action: CustomizationAction,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub custom_data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomizationDto {
    pub base_catalog_id: Uuid,
    pub base_server_name: String,
    pub action: String,
    #[schema(value_type = Object)]
    pub custom_data: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl From<customization::Model> for CustomizationDto {
    fn from(model: customization::Model) -> Self {
        Self {
            base_catalog_id: model.base_catalog_id,
            base_server_name: model.base_server_name,
            action: model.action,
            custom_data: model.custom_data,
            updated_at: model.updated_at,
        }
    }
}

// ---- catalogs ------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CatalogCreateRequest {
    pub catalog_type: String,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub precedence: Option<i32>,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CatalogUpdateRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub is_mandatory: Option<bool>,
    #[serde(default)]
    pub precedence: Option<i32>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogDto {
    pub id: Uuid,
    pub catalog_type: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub owner_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub enabled: bool,
    pub is_mandatory: bool,
    pub precedence: i32,
    pub version: String,
    pub source_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<catalog_config::Model> for CatalogDto {
    fn from(model: catalog_config::Model) -> Self {
        Self {
            id: model.id,
            catalog_type: model.catalog_type,
            name: model.name,
            display_name: model.display_name,
            description: model.description,
            owner_id: model.owner_id,
            tenant_id: model.tenant_id,
            enabled: model.enabled,
            is_mandatory: model.is_mandatory,
            precedence: model.precedence,
            version: model.version,
            source_url: model.source_url,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogDetailDto {
    #[serde(flatten)]
    pub catalog: CatalogDto,
    pub servers: Vec<CatalogServerDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ServerUpsertRequest {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub image: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub position: i32,
}

fn default_true() -> bool {
    true
}

impl ServerUpsertRequest {
    /// Materialize an entity row for `catalog_id`.
    #[must_use]
    pub fn into_model(self, catalog_id: Uuid) -> catalog_server::Model {
        let now = Utc::now();
        catalog_server::Model {
            id: Uuid::new_v4(),
            catalog_id,
            display_name: self.display_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            description: self.description.unwrap_or_default(),
            image: self.image,
            tag: self.tag.unwrap_or_else(|| "latest".to_owned()),
            env: serde_json::json!(self.env),
            volumes: serde_json::json!(self.volumes),
            ports: serde_json::json!(self.ports),
            command: serde_json::json!(self.command),
            enabled: self.enabled,
            is_override: false,
            overrides_server: None,
            position: self.position,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogServerDto {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub image: String,
    pub tag: String,
    #[schema(value_type = Object)]
    pub env: serde_json::Value,
    #[schema(value_type = Object)]
    pub volumes: serde_json::Value,
    #[schema(value_type = Object)]
    pub ports: serde_json::Value,
    #[schema(value_type = Object)]
    pub command: serde_json::Value,
    pub enabled: bool,
    pub position: i32,
}

impl From<catalog_server::Model> for CatalogServerDto {
    fn from(model: catalog_server::Model) -> Self {
        Self {
            name: model.name,
            display_name: model.display_name,
            description: model.description,
            image: model.image,
            tag: model.tag,
            env: model.env,
            volumes: model.volumes,
            ports: model.ports,
            command: model.command,
            enabled: model.enabled,
            position: model.position,
        }
    }
}

// ---- audit ---------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditRecordDto {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: String,
    pub user_id: Uuid,
    pub request_id: String,
    pub intent: Option<String>,
    #[schema(value_type = Object)]
    pub args: serde_json::Value,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
}

impl From<audit_log::Model> for AuditRecordDto {
    fn from(model: audit_log::Model) -> Self {
        Self {
            id: model.id,
            timestamp: model.timestamp,
            event_type: model.event_type,
            severity: model.severity,
            user_id: model.user_id,
            request_id: model.request_id,
            intent: model.intent,
            args: model.args,
            success: model.success,
            error: model.error,
            duration_ms: model.duration_ms,
        }
    }
}

// ---- misc ----------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    #[schema(value_type = String)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionDto {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthDto {
    pub status: &'static str,
    pub database: bool,
    pub executor: bool,
}
