//! Identity and access-scope primitives shared by every portal crate.
//!
//! The types here travel with a request: a [`VerifiedClaims`] arrives from
//! the identity provider, becomes an [`Identity`], and every storage or
//! executor call downstream receives an [`AccessScope`] derived from it.
//! Nothing in this crate talks to the network or the database.

mod claims;
mod identity;
mod role;
mod scope;

pub use claims::{ClaimsError, VerifiedClaims};
pub use identity::Identity;
pub use role::Role;
pub use scope::AccessScope;
