use serde::{Deserialize, Serialize};

/// Ordered role set. The derive order is the privilege order, so role
/// gates are plain comparisons: `identity.role >= Role::Admin`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Guest,
    User,
    Admin,
    SuperAdmin,
    SystemAdmin,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::SystemAdmin => "system_admin",
        }
    }

    /// Parse a stored role name. Unknown names map to `Guest` so a stale
    /// database value can never grant elevated access.
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "admin" => Role::Admin,
            "super_admin" => Role::SuperAdmin,
            "system_admin" => Role::SystemAdmin,
            _ => Role::Guest,
        }
    }

    /// True for roles allowed to read other users' rows within the tenant.
    #[must_use]
    pub fn is_tenant_admin(&self) -> bool {
        *self >= Role::Admin
    }

    /// True for roles allowed to read across tenant boundaries.
    #[must_use]
    pub fn is_cross_tenant(&self) -> bool {
        *self >= Role::SuperAdmin
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_privilege() {
        assert!(Role::Guest < Role::User);
        assert!(Role::User < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
        assert!(Role::SuperAdmin < Role::SystemAdmin);
    }

    #[test]
    fn parse_lossy_round_trips_known_roles() {
        for role in [
            Role::Guest,
            Role::User,
            Role::Admin,
            Role::SuperAdmin,
            Role::SystemAdmin,
        ] {
            assert_eq!(Role::parse_lossy(role.as_str()), role);
        }
    }

    #[test]
    fn parse_lossy_defaults_unknown_to_guest() {
        assert_eq!(Role::parse_lossy("root"), Role::Guest);
        assert_eq!(Role::parse_lossy(""), Role::Guest);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
    }
}
