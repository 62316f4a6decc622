//! Scope-to-condition translation.
//!
//! Every entity holding user-owned data implements [`ScopedEntity`]; the
//! repositories combine [`scope_filter`] with their own predicates so a
//! query can never leave the caller's visibility. The rules:
//!
//! 1. Roles below `admin` see only rows they own (tenant AND owner match).
//! 2. `admin` sees the whole tenant.
//! 3. `super_admin` and above see across tenants.
//!
//! Writes stamp `tenant_id`/`user_id` from the same scope, so a row can
//! never be created outside the identity that created it.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, EntityTrait};

use portal_security::AccessScope;

/// Entities whose rows are bound to a tenant and (optionally) an owner.
pub trait ScopedEntity: EntityTrait {
    fn tenant_col() -> Self::Column;

    /// `None` for tenant-level data with no single owner.
    fn owner_col() -> Option<Self::Column>;
}

/// Build the visibility condition for `scope` on entity `E`.
#[must_use]
pub fn scope_filter<E>(scope: &AccessScope) -> Condition
where
    E: ScopedEntity,
    E::Column: ColumnTrait,
{
    if scope.sees_all_tenants() {
        return Condition::all();
    }

    let mut cond = Condition::all().add(Expr::col(E::tenant_col()).eq(scope.tenant_id()));

    if !scope.sees_whole_tenant() {
        if let Some(owner) = E::owner_col() {
            cond = cond.add(Expr::col(owner).eq(scope.user_id()));
        }
    }

    cond
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_security::Role;
    use sea_orm::QueryFilter;
    use sea_orm::QueryTrait;
    use uuid::Uuid;

    use crate::entities::customization;

    fn scope(role: Role) -> AccessScope {
        AccessScope::new(Uuid::nil(), Uuid::max(), role)
    }

    /// The generated WHERE clause (empty when the scope is unfiltered).
    fn where_clause_for(scope: &AccessScope) -> String {
        let sql = customization::Entity::find()
            .filter(scope_filter::<customization::Entity>(scope))
            .build(sea_orm::DatabaseBackend::Sqlite)
            .to_string();
        sql.split("WHERE").nth(1).unwrap_or("").to_owned()
    }

    #[test]
    fn user_scope_filters_tenant_and_owner() {
        let clause = where_clause_for(&scope(Role::User));
        assert!(clause.contains("tenant_id"));
        assert!(clause.contains("user_id"));
    }

    #[test]
    fn admin_scope_filters_tenant_only() {
        let clause = where_clause_for(&scope(Role::Admin));
        assert!(clause.contains("tenant_id"));
        assert!(!clause.contains("user_id"));
    }

    #[test]
    fn super_admin_scope_is_unfiltered() {
        assert!(where_clause_for(&scope(Role::SuperAdmin)).is_empty());
    }
}
