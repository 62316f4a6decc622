use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccessScope, Role, VerifiedClaims};

/// An authenticated principal.
///
/// Identities are created on first successful external authentication and
/// mutated only by admins afterwards; the portal itself never invents one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    /// Provider subject this identity was bootstrapped from.
    pub subject: String,
    pub email: String,
    pub display_name: String,
    pub tenant_id: Uuid,
    pub role: Role,
    /// Explicit permission grants on top of the role.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Identity {
    /// Bootstrap a fresh identity from verified claims (first login).
    #[must_use]
    pub fn from_claims(claims: &VerifiedClaims) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: claims.subject.clone(),
            email: claims.email.clone(),
            display_name: claims.display_name.clone(),
            tenant_id: claims.tenant_id,
            role: claims.role(),
            permissions: BTreeSet::new(),
        }
    }

    /// The scope every store and executor call for this identity is bound to.
    #[must_use]
    pub fn scope(&self) -> AccessScope {
        AccessScope::new(self.tenant_id, self.id, self.role)
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
