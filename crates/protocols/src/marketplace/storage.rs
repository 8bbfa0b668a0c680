//! Storage layer for the marketplace metaprotocol.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use meteorite_core::error::{StorageError, StorageResult};
use meteorite_core::models::{
    ListingAction, MarketplaceCft20Detail, MarketplaceInscriptionDetail, MarketplaceListing,
};

use crate::cft20::storage::parse_numeric;

/// Insertable form of [`MarketplaceListing`]; listings start OPEN.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub chain_id: String,
    pub seller_address: String,
    pub total: u128,
    pub deposit_total: u128,
    pub deposit_timeout: u64,
    pub transaction_id: i64,
    pub date_created: DateTime<Utc>,
}

/// A deposit released by the timeout sweeper.
#[derive(Debug, Clone)]
pub struct ExpiredDeposit {
    pub listing_id: i64,
    pub depositor_address: String,
    pub transaction_id: i64,
}

pub async fn insert_listing(
    conn: &mut PgConnection,
    listing: &NewListing,
) -> StorageResult<MarketplaceListing> {
    let row = sqlx::query_as::<_, ListingRow>(
        r#"
        INSERT INTO marketplace_listings (
            chain_id, seller_address, total, deposit_total, deposit_timeout,
            transaction_id, date_created
        )
        VALUES ($1, $2, $3::NUMERIC, $4::NUMERIC, $5, $6, $7)
        RETURNING id, chain_id, seller_address, total::TEXT, deposit_total::TEXT,
                  deposit_timeout, depositor_address, depositor_timedout_block,
                  is_deposited, is_filled, is_cancelled, transaction_id,
                  date_created, date_updated
        "#,
    )
    .bind(&listing.chain_id)
    .bind(&listing.seller_address)
    .bind(listing.total.to_string())
    .bind(listing.deposit_total.to_string())
    .bind(listing.deposit_timeout as i64)
    .bind(listing.transaction_id)
    .bind(listing.date_created)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    row.into_listing()
}

pub async fn get_listing(
    conn: &mut PgConnection,
    listing_id: i64,
) -> StorageResult<Option<MarketplaceListing>> {
    let row = sqlx::query_as::<_, ListingRow>(
        r#"
        SELECT id, chain_id, seller_address, total::TEXT, deposit_total::TEXT,
               deposit_timeout, depositor_address, depositor_timedout_block,
               is_deposited, is_filled, is_cancelled, transaction_id,
               date_created, date_updated
        FROM marketplace_listings
        WHERE id = $1
        "#,
    )
    .bind(listing_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    row.map(ListingRow::into_listing).transpose()
}

pub async fn insert_inscription_detail(
    conn: &mut PgConnection,
    listing_id: i64,
    inscription_id: i64,
) -> StorageResult<()> {
    sqlx::query(
        "INSERT INTO marketplace_inscription_details (listing_id, inscription_id) VALUES ($1, $2)",
    )
    .bind(listing_id)
    .bind(inscription_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

pub async fn insert_cft20_detail(
    conn: &mut PgConnection,
    listing_id: i64,
    token_id: i64,
    amount: u128,
    ppt: u128,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO marketplace_cft20_details (listing_id, token_id, amount, ppt)
        VALUES ($1, $2, $3::NUMERIC, $4::NUMERIC)
        "#,
    )
    .bind(listing_id)
    .bind(token_id)
    .bind(amount.to_string())
    .bind(ppt.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

pub async fn get_inscription_detail(
    conn: &mut PgConnection,
    listing_id: i64,
) -> StorageResult<Option<MarketplaceInscriptionDetail>> {
    let row: Option<(i64, i64, i64)> = sqlx::query_as(
        "SELECT id, listing_id, inscription_id FROM marketplace_inscription_details WHERE listing_id = $1",
    )
    .bind(listing_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(row.map(|(id, listing_id, inscription_id)| MarketplaceInscriptionDetail {
        id,
        listing_id,
        inscription_id,
    }))
}

pub async fn get_cft20_detail(
    conn: &mut PgConnection,
    listing_id: i64,
) -> StorageResult<Option<MarketplaceCft20Detail>> {
    let row: Option<(i64, i64, i64, String, String)> = sqlx::query_as(
        r#"
        SELECT id, listing_id, token_id, amount::TEXT, ppt::TEXT
        FROM marketplace_cft20_details
        WHERE listing_id = $1
        "#,
    )
    .bind(listing_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    row.map(|(id, listing_id, token_id, amount, ppt)| {
        Ok(MarketplaceCft20Detail {
            id,
            listing_id,
            token_id,
            amount: parse_numeric(&amount, "marketplace_cft20_details.amount")?,
            ppt: parse_numeric(&ppt, "marketplace_cft20_details.ppt")?,
        })
    })
    .transpose()
}

/// Whether an inscription already sits in a live listing.
pub async fn inscription_has_live_listing(
    conn: &mut PgConnection,
    inscription_id: i64,
) -> StorageResult<bool> {
    crate::inscription::storage::has_live_listing(conn, inscription_id).await
}

/// OPEN -> RESERVED.
pub async fn set_deposit(
    conn: &mut PgConnection,
    listing_id: i64,
    depositor: &str,
    timedout_block: u64,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        UPDATE marketplace_listings
        SET is_deposited = TRUE, depositor_address = $2,
            depositor_timedout_block = $3, date_updated = $4
        WHERE id = $1
        "#,
    )
    .bind(listing_id)
    .bind(depositor)
    .bind(timedout_block as i64)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// RESERVED -> FILLED. Terminal.
pub async fn set_filled(
    conn: &mut PgConnection,
    listing_id: i64,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        UPDATE marketplace_listings
        SET is_filled = TRUE, is_deposited = FALSE, date_updated = $2
        WHERE id = $1
        "#,
    )
    .bind(listing_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// OPEN/RESERVED -> CANCELLED. Terminal.
pub async fn set_cancelled(
    conn: &mut PgConnection,
    listing_id: i64,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        UPDATE marketplace_listings
        SET is_cancelled = TRUE, is_deposited = FALSE, depositor_address = NULL,
            depositor_timedout_block = NULL, date_updated = $2
        WHERE id = $1
        "#,
    )
    .bind(listing_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Release every deposit whose reservation window ended before `height`,
/// putting those listings back to OPEN. Returns what was released so the
/// caller can write history rows.
pub async fn expire_deposits(
    conn: &mut PgConnection,
    height: u64,
    now: DateTime<Utc>,
) -> StorageResult<Vec<ExpiredDeposit>> {
    let rows: Vec<(i64, String, i64)> = sqlx::query_as(
        r#"
        WITH expired AS (
            SELECT id, depositor_address, transaction_id
            FROM marketplace_listings
            WHERE is_deposited AND NOT is_filled AND NOT is_cancelled
              AND depositor_timedout_block < $1
            FOR UPDATE
        )
        UPDATE marketplace_listings l
        SET is_deposited = FALSE, depositor_address = NULL,
            depositor_timedout_block = NULL, date_updated = $2
        FROM expired e
        WHERE l.id = e.id
        RETURNING e.id, e.depositor_address, e.transaction_id
        "#,
    )
    .bind(height as i64)
    .bind(now)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(listing_id, depositor_address, transaction_id)| ExpiredDeposit {
            listing_id,
            depositor_address,
            transaction_id,
        })
        .collect())
}

/// Append a listing-level history row.
///
/// Unlike the per-entity history tables, `transaction_id` is not unique
/// here: a listing's own transaction also anchors its timeout rows.
pub async fn insert_listing_history(
    conn: &mut PgConnection,
    listing_id: i64,
    sender_address: &str,
    action: ListingAction,
    transaction_id: i64,
    height: u64,
    date_created: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO marketplace_listing_history (
            listing_id, sender_address, action, transaction_id, height, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(listing_id)
    .bind(sender_address)
    .bind(action.as_str())
    .bind(transaction_id)
    .bind(height as i64)
    .bind(date_created)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Append a CFT-20 marketplace fill.
#[allow(clippy::too_many_arguments)]
pub async fn insert_cft20_trade(
    conn: &mut PgConnection,
    chain_id: &str,
    listing_id: i64,
    transaction_id: i64,
    seller: &str,
    buyer: &str,
    amount_base: u128,
    amount_quote: u128,
    rate: u128,
    total_usd: f64,
    height: u64,
    date_created: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO marketplace_cft20_trade_history (
            chain_id, listing_id, transaction_id, seller_address, buyer_address,
            amount_base, amount_quote, rate, total_usd, height, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, $7::NUMERIC, $8::NUMERIC, $9, $10, $11)
        "#,
    )
    .bind(chain_id)
    .bind(listing_id)
    .bind(transaction_id)
    .bind(seller)
    .bind(buyer)
    .bind(amount_base.to_string())
    .bind(amount_quote.to_string())
    .bind(rate.to_string())
    .bind(total_usd)
    .bind(height as i64)
    .bind(date_created)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Append an inscription marketplace fill.
#[allow(clippy::too_many_arguments)]
pub async fn insert_inscription_trade(
    conn: &mut PgConnection,
    chain_id: &str,
    inscription_id: i64,
    transaction_id: i64,
    seller: &str,
    buyer: &str,
    amount_base: u128,
    total_usd: f64,
    height: u64,
    date_created: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inscription_trade_history (
            chain_id, inscription_id, transaction_id, seller_address, buyer_address,
            amount_base, amount_quote, rate, total_usd, height, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, 1, $6::NUMERIC, $7, $8, $9)
        "#,
    )
    .bind(chain_id)
    .bind(inscription_id)
    .bind(transaction_id)
    .bind(seller)
    .bind(buyer)
    .bind(amount_base.to_string())
    .bind(total_usd)
    .bind(height as i64)
    .bind(date_created)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// USD price of the base token at processing time, from the status row.
pub async fn base_token_usd(conn: &mut PgConnection, chain_id: &str) -> StorageResult<f64> {
    let row: Option<(f64,)> =
        sqlx::query_as("SELECT base_token_usd FROM status WHERE chain_id = $1")
            .bind(chain_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(row.map(|(usd,)| usd).unwrap_or(0.0))
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: i64,
    chain_id: String,
    seller_address: String,
    total: String,
    deposit_total: String,
    deposit_timeout: i64,
    depositor_address: Option<String>,
    depositor_timedout_block: Option<i64>,
    is_deposited: bool,
    is_filled: bool,
    is_cancelled: bool,
    transaction_id: i64,
    date_created: DateTime<Utc>,
    date_updated: Option<DateTime<Utc>>,
}

impl ListingRow {
    fn into_listing(self) -> StorageResult<MarketplaceListing> {
        Ok(MarketplaceListing {
            id: self.id,
            chain_id: self.chain_id,
            seller_address: self.seller_address,
            total: parse_numeric(&self.total, "marketplace_listings.total")?,
            deposit_total: parse_numeric(&self.deposit_total, "marketplace_listings.deposit_total")?,
            deposit_timeout: self.deposit_timeout as u64,
            depositor_address: self.depositor_address,
            depositor_timedout_block: self.depositor_timedout_block.map(|h| h as u64),
            is_deposited: self.is_deposited,
            is_filled: self.is_filled,
            is_cancelled: self.is_cancelled,
            transaction_id: self.transaction_id,
            date_created: self.date_created,
            date_updated: self.date_updated,
        })
    }
}
