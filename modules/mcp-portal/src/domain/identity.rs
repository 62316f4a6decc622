use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use portal_db::entities::identity as identity_entity;
use portal_db::repos::{self, Page};
use portal_db::DbHandle;
use portal_security::{AccessScope, Identity, Role, VerifiedClaims};

use crate::domain::DomainError;

/// Identity bootstrap and administration.
pub struct IdentityService {
    db: DbHandle,
}

impl IdentityService {
    #[must_use]
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Login path: create the identity on first authentication, sync the
    /// mutable profile fields afterwards. Role is assigned from group
    /// membership once at creation and changed only by admins.
    #[instrument(skip_all, fields(subject = %claims.subject))]
    pub async fn login(&self, claims: &VerifiedClaims) -> Result<Identity, DomainError> {
        claims
            .validate()
            .map_err(|e| DomainError::validation("claims", e.to_string()))?;

        if let Some(existing) =
            repos::identities::find_by_subject(self.db.conn(), &claims.subject).await?
        {
            if existing.email != claims.email || existing.display_name != claims.display_name {
                repos::identities::touch_profile(
                    self.db.conn(),
                    existing.id,
                    &claims.email,
                    &claims.display_name,
                )
                .await?;
            }
            let mut identity = to_identity(existing);
            identity.email = claims.email.clone();
            identity.display_name = claims.display_name.clone();
            return Ok(identity);
        }

        let identity = Identity::from_claims(claims);
        let now = Utc::now();
        let model = identity_entity::Model {
            id: identity.id,
            subject: identity.subject.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            tenant_id: identity.tenant_id,
            role: identity.role.as_str().to_owned(),
            permissions: serde_json::json!([]),
            created_at: now,
            updated_at: now,
        };
        repos::identities::insert(self.db.conn(), model).await?;
        info!(identity_id = %identity.id, role = %identity.role, "identity created on first login");
        Ok(identity)
    }

    pub async fn get(&self, scope: &AccessScope, id: Uuid) -> Result<Identity, DomainError> {
        let model = repos::identities::get(self.db.conn(), scope, id)
            .await?
            .ok_or(DomainError::NotFound("identity"))?;
        Ok(to_identity(model))
    }

    /// Load by primary key without scope filtering. Used by the session
    /// middleware, which establishes the identity a scope is built from.
    pub async fn load_for_session(&self, id: Uuid) -> Result<Identity, DomainError> {
        let scope = AccessScope::new(Uuid::nil(), id, Role::SystemAdmin);
        let model = repos::identities::get(self.db.conn(), &scope, id)
            .await?
            .ok_or(DomainError::NotFound("identity"))?;
        Ok(to_identity(model))
    }

    pub async fn list(
        &self,
        scope: &AccessScope,
        page: Page,
    ) -> Result<Vec<Identity>, DomainError> {
        if !scope.sees_whole_tenant() {
            return Err(DomainError::Forbidden);
        }
        let models = repos::identities::list(self.db.conn(), scope, page).await?;
        Ok(models.into_iter().map(to_identity).collect())
    }

    /// Admin role change. Nobody can grant a role above their own.
    #[instrument(skip(self, scope))]
    pub async fn update_role(
        &self,
        scope: &AccessScope,
        id: Uuid,
        role: Role,
    ) -> Result<Identity, DomainError> {
        if !scope.sees_whole_tenant() {
            return Err(DomainError::Forbidden);
        }
        if role > scope.role() {
            return Err(DomainError::Forbidden);
        }
        let model =
            repos::identities::update_role(self.db.conn(), scope, id, role.as_str()).await?;
        info!(identity_id = %id, new_role = %role, "identity role updated");
        Ok(to_identity(model))
    }
}

fn to_identity(model: identity_entity::Model) -> Identity {
    let permissions: BTreeSet<String> =
        serde_json::from_value(model.permissions).unwrap_or_default();
    Identity {
        id: model.id,
        subject: model.subject,
        email: model.email,
        display_name: model.display_name,
        tenant_id: model.tenant_id,
        role: Role::parse_lossy(&model.role),
        permissions,
    }
}
