//! Identity-provider seam.
//!
//! The portal consumes verified claims; whatever performs the actual
//! OAuth2 exchange sits behind [`ClaimsVerifier`]. The static
//! implementation serves development and single-box deployments where an
//! external gateway already authenticated the caller.

use std::collections::HashMap;

use async_trait::async_trait;

use portal_security::VerifiedClaims;

use crate::config::StaticUser;
use crate::domain::DomainError;

#[async_trait]
pub trait ClaimsVerifier: Send + Sync {
    /// Exchange an opaque provider token for verified claims.
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, DomainError>;
}

/// Token → claims table from configuration.
pub struct StaticClaimsVerifier {
    users: HashMap<String, VerifiedClaims>,
}

impl StaticClaimsVerifier {
    #[must_use]
    pub fn new(users: &[StaticUser]) -> Self {
        let users = users
            .iter()
            .map(|u| {
                (
                    u.token.clone(),
                    VerifiedClaims {
                        subject: u.subject.clone(),
                        email: u.email.clone(),
                        display_name: u.display_name.clone(),
                        tenant_id: u.tenant_id,
                        groups: u.groups.clone(),
                    },
                )
            })
            .collect();
        Self { users }
    }
}

#[async_trait]
impl ClaimsVerifier for StaticClaimsVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, DomainError> {
        self.users
            .get(token)
            .cloned()
            .ok_or(DomainError::Unauthorized)
    }
}
