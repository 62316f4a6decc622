use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Role;

/// Group names the identity provider reports, in descending privilege
/// order. The first match wins.
const GROUP_ROLE_MAP: &[(&str, Role)] = &[
    ("super-administrators", Role::SuperAdmin),
    ("administrators", Role::Admin),
    ("users", Role::User),
];

/// Claims already verified by the identity provider boundary.
///
/// The portal never performs the OAuth2 exchange itself; whatever component
/// does hands over this struct. Everything in it is trusted as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// Stable subject identifier from the provider.
    pub subject: String,
    pub email: String,
    pub display_name: String,
    /// Provider tenant, e.g. the Entra ID directory the user belongs to.
    pub tenant_id: Uuid,
    /// Group memberships used for role mapping.
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("claims are missing a subject")]
    MissingSubject,
    #[error("claims are missing an email")]
    MissingEmail,
}

impl VerifiedClaims {
    /// Map group memberships to a role. Users without any recognized group
    /// stay guests.
    #[must_use]
    pub fn role(&self) -> Role {
        for (group, role) in GROUP_ROLE_MAP {
            if self.groups.iter().any(|g| g == group) {
                return *role;
            }
        }
        Role::Guest
    }

    /// Reject claim sets that cannot identify a user.
    ///
    /// # Errors
    /// Returns [`ClaimsError`] when subject or email is empty.
    pub fn validate(&self) -> Result<(), ClaimsError> {
        if self.subject.trim().is_empty() {
            return Err(ClaimsError::MissingSubject);
        }
        if self.email.trim().is_empty() {
            return Err(ClaimsError::MissingEmail);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(groups: &[&str]) -> VerifiedClaims {
        VerifiedClaims {
            subject: "sub-1".to_owned(),
            email: "alice@example.com".to_owned(),
            display_name: "Alice".to_owned(),
            tenant_id: Uuid::new_v4(),
            groups: groups.iter().map(|g| (*g).to_owned()).collect(),
        }
    }

    #[test]
    fn highest_privileged_group_wins() {
        assert_eq!(
            claims(&["users", "super-administrators"]).role(),
            Role::SuperAdmin
        );
        assert_eq!(claims(&["administrators", "users"]).role(), Role::Admin);
        assert_eq!(claims(&["users"]).role(), Role::User);
    }

    #[test]
    fn no_recognized_group_maps_to_guest() {
        assert_eq!(claims(&[]).role(), Role::Guest);
        assert_eq!(claims(&["board-members"]).role(), Role::Guest);
    }

    #[test]
    fn validate_rejects_empty_subject() {
        let mut c = claims(&["users"]);
        c.subject = "  ".to_owned();
        assert!(matches!(c.validate(), Err(ClaimsError::MissingSubject)));
    }

    #[test]
    fn validate_rejects_empty_email() {
        let mut c = claims(&["users"]);
        c.email = String::new();
        assert!(matches!(c.validate(), Err(ClaimsError::MissingEmail)));
    }
}
