//! Storage layer for the inscription metaprotocol.
//!
//! Every function runs on the connection the pipeline hands the processor,
//! which is a savepoint inside the per-transaction database transaction.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use meteorite_core::error::{StorageError, StorageResult};
use meteorite_core::models::{Inscription, InscriptionAction};

/// Insertable form of [`Inscription`].
#[derive(Debug, Clone)]
pub struct NewInscription {
    pub chain_id: String,
    pub height: u64,
    pub version: String,
    pub transaction_id: i64,
    pub content_hash: String,
    pub creator: String,
    pub content_type: String,
    pub metadata: serde_json::Value,
    pub content_path: String,
    pub content_size_bytes: u64,
    pub date_created: DateTime<Utc>,
}

/// Look up an inscription by its content hash.
pub async fn get_by_content_hash(
    conn: &mut PgConnection,
    chain_id: &str,
    content_hash: &str,
) -> StorageResult<Option<Inscription>> {
    let row = sqlx::query_as::<_, InscriptionRow>(
        r#"
        SELECT id, chain_id, height, version, transaction_id, content_hash,
               creator, current_owner, content_type, metadata, content_path,
               content_size_bytes, is_explicit, date_created
        FROM inscriptions
        WHERE chain_id = $1 AND content_hash = $2
        "#,
    )
    .bind(chain_id)
    .bind(content_hash)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(row.map(InscriptionRow::into_inscription))
}

/// Insert a new inscription; the creator starts as current owner.
pub async fn insert(
    conn: &mut PgConnection,
    inscription: &NewInscription,
) -> StorageResult<Inscription> {
    let row = sqlx::query_as::<_, InscriptionRow>(
        r#"
        INSERT INTO inscriptions (
            chain_id, height, version, transaction_id, content_hash,
            creator, current_owner, content_type, metadata, content_path,
            content_size_bytes, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9, $10, $11)
        RETURNING id, chain_id, height, version, transaction_id, content_hash,
                  creator, current_owner, content_type, metadata, content_path,
                  content_size_bytes, is_explicit, date_created
        "#,
    )
    .bind(&inscription.chain_id)
    .bind(inscription.height as i64)
    .bind(&inscription.version)
    .bind(inscription.transaction_id)
    .bind(&inscription.content_hash)
    .bind(&inscription.creator)
    .bind(&inscription.content_type)
    .bind(&inscription.metadata)
    .bind(&inscription.content_path)
    .bind(inscription.content_size_bytes as i64)
    .bind(inscription.date_created)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(row.into_inscription())
}

/// Hand ownership of an inscription to a new address.
pub async fn update_owner(
    conn: &mut PgConnection,
    inscription_id: i64,
    new_owner: &str,
) -> StorageResult<()> {
    sqlx::query("UPDATE inscriptions SET current_owner = $2 WHERE id = $1")
        .bind(inscription_id)
        .bind(new_owner)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Whether the inscription sits in a live (neither filled nor cancelled)
/// marketplace listing. Listed inscriptions refuse transfers; the listing
/// is the logical escrow.
pub async fn has_live_listing(
    conn: &mut PgConnection,
    inscription_id: i64,
) -> StorageResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT l.id
        FROM marketplace_listings l
        JOIN marketplace_inscription_details d ON d.listing_id = l.id
        WHERE d.inscription_id = $1
          AND NOT l.is_filled
          AND NOT l.is_cancelled
        LIMIT 1
        "#,
    )
    .bind(inscription_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(row.is_some())
}

/// Append an inscription history row. One row per state-affecting
/// transaction; `transaction_id` is unique.
pub async fn insert_history(
    conn: &mut PgConnection,
    chain_id: &str,
    inscription_id: i64,
    transaction_id: i64,
    sender: &str,
    receiver: Option<&str>,
    action: InscriptionAction,
    height: u64,
    date_created: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inscription_history (
            chain_id, inscription_id, transaction_id, sender, receiver,
            action, height, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(chain_id)
    .bind(inscription_id)
    .bind(transaction_id)
    .bind(sender)
    .bind(receiver)
    .bind(action.as_str())
    .bind(height as i64)
    .bind(date_created)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct InscriptionRow {
    id: i64,
    chain_id: String,
    height: i64,
    version: String,
    transaction_id: i64,
    content_hash: String,
    creator: String,
    current_owner: String,
    content_type: String,
    metadata: serde_json::Value,
    content_path: String,
    content_size_bytes: i64,
    is_explicit: bool,
    date_created: DateTime<Utc>,
}

impl InscriptionRow {
    fn into_inscription(self) -> Inscription {
        Inscription {
            id: self.id,
            chain_id: self.chain_id,
            height: self.height as u64,
            version: self.version,
            transaction_id: self.transaction_id,
            content_hash: self.content_hash,
            creator: self.creator,
            current_owner: self.current_owner,
            content_type: self.content_type,
            metadata: self.metadata,
            content_path: self.content_path,
            content_size_bytes: self.content_size_bytes as u64,
            is_explicit: self.is_explicit,
            date_created: self.date_created,
        }
    }
}
