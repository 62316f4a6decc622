use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Role;

/// The tenant/user/role triple every storage query is bound to.
///
/// A scope is derived from an authenticated [`crate::Identity`] and passed
/// explicitly through the call chain; it is never ambient process state.
/// The storage layer widens visibility with the role: plain users see only
/// their own rows, tenant admins see the whole tenant, super admins cross
/// tenants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    tenant_id: Uuid,
    user_id: Uuid,
    role: Role,
}

impl AccessScope {
    #[must_use]
    pub fn new(tenant_id: Uuid, user_id: Uuid, role: Role) -> Self {
        Self {
            tenant_id,
            user_id,
            role,
        }
    }

    #[inline]
    #[must_use]
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    #[inline]
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    #[inline]
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// True if this scope may read rows owned by other users of its tenant.
    #[must_use]
    pub fn sees_whole_tenant(&self) -> bool {
        self.role.is_tenant_admin()
    }

    /// True if this scope may read rows belonging to other tenants.
    #[must_use]
    pub fn sees_all_tenants(&self) -> bool {
        self.role.is_cross_tenant()
    }

    // audit helpers
    #[inline]
    #[must_use]
    pub fn created_by(&self) -> Uuid {
        self.user_id
    }
}
