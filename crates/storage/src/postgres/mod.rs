//! PostgreSQL storage adapter.
//!
//! This module implements the repository trait defined in `meteorite-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgRepositories`] - Pipeline repository implementing the
//!   `Repositories` port (checkpoint + transaction log + transactional
//!   scoping)
//!
//! Protocol-owned tables are written by the protocol bundles through the
//! connection the pipeline hands them; this adapter only owns the core
//! schema.
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

mod database;

pub use database::{Database, DatabaseConfig, PurgeStats};

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgConnection;

use meteorite_core::error::{StorageError, StorageResult};
use meteorite_core::models::{NewTransaction, Status, Transaction};
use meteorite_core::ports::{DbTransaction, Repositories};

// =============================================================================
// Pipeline Repository
// =============================================================================

/// PostgreSQL implementation of the pipeline `Repositories` port.
pub struct PgRepositories {
    db: Arc<Database>,
}

impl PgRepositories {
    /// Create a new repository from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    async fn begin(&self) -> StorageResult<DbTransaction> {
        self.db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))
    }

    async fn status(&self, chain_id: &str) -> StorageResult<Option<Status>> {
        let row = sqlx::query_as::<_, StatusRow>(
            r#"
            SELECT id, chain_id, last_processed_height, last_known_height,
                   base_token, base_token_usd, date_updated
            FROM status
            WHERE chain_id = $1
            "#,
        )
        .bind(chain_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(StatusRow::into_status))
    }

    async fn ensure_status(&self, chain_id: &str, base_token: &str) -> StorageResult<Status> {
        sqlx::query(
            r#"
            INSERT INTO status (chain_id, base_token, date_updated)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain_id) DO NOTHING
            "#,
        )
        .bind(chain_id)
        .bind(base_token)
        .execute(self.db.pool())
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        self.status(chain_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("status for chain {}", chain_id)))
    }

    async fn checkpoint(
        &self,
        conn: &mut PgConnection,
        chain_id: &str,
        last_processed_height: u64,
        last_known_height: u64,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE status
            SET last_processed_height = $2,
                last_known_height = GREATEST(last_known_height, $3),
                date_updated = NOW()
            WHERE chain_id = $1
            "#,
        )
        .bind(chain_id)
        .bind(last_processed_height as i64)
        .bind(last_known_height as i64)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }

    async fn insert_transaction(
        &self,
        conn: &mut PgConnection,
        tx: &NewTransaction,
    ) -> StorageResult<Option<Transaction>> {
        // ON CONFLICT DO NOTHING + RETURNING yields no row for duplicates,
        // which is how replayed heights short-circuit.
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                height, hash, content, gas_used, fees, content_length, date_created
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (hash) DO NOTHING
            RETURNING id, height, hash, content, gas_used, fees, content_length,
                      status_message, date_created
            "#,
        )
        .bind(tx.height as i64)
        .bind(&tx.hash)
        .bind(&tx.content)
        .bind(tx.gas_used as i64)
        .bind(&tx.fees)
        .bind(tx.content_length as i64)
        .bind(tx.date_created)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(TransactionRow::into_transaction))
    }

    async fn set_transaction_error(
        &self,
        conn: &mut PgConnection,
        transaction_id: i64,
        message: &str,
    ) -> StorageResult<()> {
        sqlx::query("UPDATE transactions SET status_message = $2 WHERE id = $1")
            .bind(transaction_id)
            .bind(message)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct StatusRow {
    id: i64,
    chain_id: String,
    last_processed_height: i64,
    last_known_height: i64,
    base_token: String,
    base_token_usd: f64,
    date_updated: chrono::DateTime<chrono::Utc>,
}

impl StatusRow {
    fn into_status(self) -> Status {
        Status {
            id: self.id,
            chain_id: self.chain_id,
            last_processed_height: self.last_processed_height as u64,
            last_known_height: self.last_known_height as u64,
            base_token: self.base_token,
            base_token_usd: self.base_token_usd,
            date_updated: self.date_updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    height: i64,
    hash: String,
    content: String,
    gas_used: i64,
    fees: String,
    content_length: i64,
    status_message: Option<String>,
    date_created: chrono::DateTime<chrono::Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> Transaction {
        Transaction {
            id: self.id,
            height: self.height as u64,
            hash: self.hash,
            content: self.content,
            gas_used: self.gas_used as u64,
            fees: self.fees,
            content_length: self.content_length as u64,
            status_message: self.status_message,
            date_created: self.date_created,
        }
    }
}
