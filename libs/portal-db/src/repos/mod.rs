//! Repository functions. Every function touching user-owned data takes an
//! [`portal_security::AccessScope`] and filters/stamps through it; the two
//! deliberate exceptions are documented where they live (session lookup,
//! identity bootstrap).

pub mod audit;
pub mod catalogs;
pub mod customizations;
pub mod identities;
pub mod sessions;

/// Offset/limit pagination with sane caps.
#[derive(Clone, Copy, Debug)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub const MAX_LIMIT: u64 = 500;

    #[must_use]
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}
