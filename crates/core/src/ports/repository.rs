//! Port traits for data repositories.
//!
//! The repository is deliberately small: the pipeline needs the checkpoint
//! row, the transaction log, and transactional scoping. Protocol-owned
//! tables are written by the protocol bundles themselves through the
//! database transaction the pipeline hands them.
//!
//! Savepoints matter here: the pipeline wraps every protocol call in a
//! nested transaction so a failed operation rolls back its own writes while
//! the `transactions` row stays committed.

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::PgConnection;

use crate::error::{StorageError, StorageResult};
use crate::models::{NewTransaction, Status, Transaction};

/// A database transaction scoped to the connection pool.
///
/// Calling `begin` on it again opens a savepoint.
pub type DbTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

/// Repository access for the indexing pipeline.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Open a database transaction.
    async fn begin(&self) -> StorageResult<DbTransaction>;

    /// Read the checkpoint row for a chain, outside any transaction.
    async fn status(&self, chain_id: &str) -> StorageResult<Option<Status>>;

    /// Create the checkpoint row for a chain if it does not exist yet.
    async fn ensure_status(&self, chain_id: &str, base_token: &str) -> StorageResult<Status>;

    /// Advance the checkpoint. Called once per fully processed height.
    async fn checkpoint(
        &self,
        conn: &mut PgConnection,
        chain_id: &str,
        last_processed_height: u64,
        last_known_height: u64,
    ) -> StorageResult<()>;

    /// Insert a transaction row.
    ///
    /// Returns `None` when a row with the same hash already exists, which is
    /// how replayed heights are detected and skipped.
    async fn insert_transaction(
        &self,
        conn: &mut PgConnection,
        tx: &NewTransaction,
    ) -> StorageResult<Option<Transaction>>;

    /// Record why protocol processing of a transaction failed.
    async fn set_transaction_error(
        &self,
        conn: &mut PgConnection,
        transaction_id: i64,
        message: &str,
    ) -> StorageResult<()>;

    /// Run `f` inside a transaction.
    ///
    /// Commits on `Ok`, rolls back on `Err`. The transaction is also rolled
    /// back if `f` panics or the future is dropped, so no connection is ever
    /// left holding an open transaction.
    async fn within_tx<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, StorageResult<T>> + Send,
    {
        let mut tx = self.begin().await?;
        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| StorageError::TransactionError(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                // Explicit rollback keeps the error observable; Drop would
                // also roll back.
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}
