//! `SeaORM` entities for the portal's logical tables.

pub mod audit_log;
pub mod catalog_config;
pub mod catalog_server;
pub mod customization;
pub mod identity;
pub mod session;
