//! Domain services. Everything here takes explicit
//! [`portal_security::AccessScope`]/[`portal_security::Identity`] values;
//! nothing reads ambient request state.

pub mod catalog;
pub mod error;
pub mod identity;
pub mod servers;
pub mod sessions;

pub use error::DomainError;
