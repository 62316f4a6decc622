//! Tenant-isolated persistence.
//!
//! The rest of the system never touches a raw connection for user-owned
//! data: repositories take an [`portal_security::AccessScope`] and the
//! scope filter in [`scope`] decides row visibility. A scope that lacks
//! the role to see a row makes the row invisible, so cross-tenant and
//! cross-user probes come back as "not found", never "forbidden".

pub mod entities;
pub mod error;
pub mod migrations;
pub mod repos;
pub mod scope;

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, TransactionTrait};
use sea_orm_migration::MigratorTrait;

pub use error::StoreError;
pub use scope::{ScopedEntity, scope_filter};

/// Shared handle to the portal database.
#[derive(Clone)]
pub struct DbHandle {
    conn: DatabaseConnection,
}

impl DbHandle {
    /// Connect and run pending migrations.
    ///
    /// # Errors
    /// Returns [`StoreError::Database`] when the DSN is unreachable or a
    /// migration fails.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new(dsn.to_owned());
        // An in-memory SQLite database exists per connection; a pool of one
        // keeps every query on the same database.
        let max_connections = if dsn.contains(":memory:") { 1 } else { 16 };
        options
            .max_connections(max_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(options).await?;
        migrations::Migrator::up(&conn, None).await?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection (tests).
    #[must_use]
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Cheap connectivity probe for the health endpoint.
    ///
    /// # Errors
    /// Returns [`StoreError::Database`] when the backend does not respond.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.conn.ping().await?;
        Ok(())
    }

    /// Run `op` inside a transaction, retrying a bounded number of times on
    /// conflict. Readers never observe a partially applied operation.
    ///
    /// # Errors
    /// Returns the error of the last attempt when all retries fail.
    pub async fn transaction_with_retry<F, T>(&self, attempts: u32, op: F) -> Result<T, StoreError>
    where
        F: for<'c> Fn(
                &'c sea_orm::DatabaseTransaction,
            ) -> std::pin::Pin<
                Box<dyn Future<Output = Result<T, StoreError>> + Send + 'c>,
            > + Send
            + Sync,
        T: Send,
    {
        let mut last = None;
        for attempt in 0..attempts.max(1) {
            let txn = self.conn.begin().await?;
            match op(&txn).await {
                Ok(value) => {
                    txn.commit().await?;
                    return Ok(value);
                }
                Err(e) => {
                    let _ = txn.rollback().await;
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    tracing::debug!(attempt, error = %e, "transaction conflict, retrying");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| StoreError::Database("transaction retry exhausted".to_owned())))
    }
}
