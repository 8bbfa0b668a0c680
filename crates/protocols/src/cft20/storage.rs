//! Storage layer for the CFT-20 metaprotocol.
//!
//! Token quantities are `NUMERIC(39,0)` in PostgreSQL and `u128` in Rust;
//! they cross the boundary as strings. All functions run on the savepoint
//! connection the pipeline hands the processor.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use meteorite_core::error::{StorageError, StorageResult};
use meteorite_core::models::{Token, TokenAction};

/// Insertable form of [`Token`].
#[derive(Debug, Clone)]
pub struct NewToken {
    pub chain_id: String,
    pub height: u64,
    pub version: String,
    pub transaction_id: i64,
    pub ticker: String,
    pub name: String,
    pub decimals: u32,
    pub max_supply: u128,
    pub per_mint_limit: u128,
    pub launch_height: u64,
    pub creator: String,
    pub mint_page: String,
    pub metadata: Option<serde_json::Value>,
    pub content_path: Option<String>,
    pub date_created: DateTime<Utc>,
}

/// Parse a `NUMERIC(39,0)::TEXT` column into a `u128`.
pub(crate) fn parse_numeric(s: &str, field: &str) -> StorageResult<u128> {
    s.parse().map_err(|e| {
        StorageError::SerializationError(format!("{} parse error: {} (value: {})", field, e, s))
    })
}

/// Look up a token by its (already normalized) ticker.
pub async fn get_by_ticker(
    conn: &mut PgConnection,
    chain_id: &str,
    ticker: &str,
) -> StorageResult<Option<Token>> {
    let row = sqlx::query_as::<_, TokenRow>(
        r#"
        SELECT id, chain_id, height, version, transaction_id, ticker, name,
               decimals, max_supply::TEXT, per_mint_limit::TEXT, launch_height,
               circulating_supply::TEXT, last_price_base::TEXT, volume_24_base::TEXT,
               creator, current_owner, mint_page, metadata, content_path,
               is_explicit, date_created
        FROM tokens
        WHERE chain_id = $1 AND ticker = $2
        "#,
    )
    .bind(chain_id)
    .bind(ticker)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    row.map(TokenRow::into_token).transpose()
}

/// Insert a freshly deployed token with zero circulating supply.
pub async fn insert(conn: &mut PgConnection, token: &NewToken) -> StorageResult<Token> {
    let row = sqlx::query_as::<_, TokenRow>(
        r#"
        INSERT INTO tokens (
            chain_id, height, version, transaction_id, ticker, name, decimals,
            max_supply, per_mint_limit, launch_height, creator, current_owner,
            mint_page, metadata, content_path, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8::NUMERIC, $9::NUMERIC, $10,
                $11, $11, $12, $13, $14, $15)
        RETURNING id, chain_id, height, version, transaction_id, ticker, name,
                  decimals, max_supply::TEXT, per_mint_limit::TEXT, launch_height,
                  circulating_supply::TEXT, last_price_base::TEXT, volume_24_base::TEXT,
                  creator, current_owner, mint_page, metadata, content_path,
                  is_explicit, date_created
        "#,
    )
    .bind(&token.chain_id)
    .bind(token.height as i64)
    .bind(&token.version)
    .bind(token.transaction_id)
    .bind(&token.ticker)
    .bind(&token.name)
    .bind(token.decimals as i32)
    .bind(token.max_supply.to_string())
    .bind(token.per_mint_limit.to_string())
    .bind(token.launch_height as i64)
    .bind(&token.creator)
    .bind(&token.mint_page)
    .bind(&token.metadata)
    .bind(&token.content_path)
    .bind(token.date_created)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    row.into_token()
}

/// Current balance of an address; zero when no holder row exists.
pub async fn holder_balance(
    conn: &mut PgConnection,
    token_id: i64,
    address: &str,
) -> StorageResult<u128> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT amount::TEXT FROM token_holders WHERE token_id = $1 AND address = $2",
    )
    .bind(token_id)
    .bind(address)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    match row {
        Some((amount,)) => parse_numeric(&amount, "token_holders.amount"),
        None => Ok(0),
    }
}

/// Credit an address, creating the holder row if needed.
pub async fn credit_holder(
    conn: &mut PgConnection,
    chain_id: &str,
    token_id: i64,
    address: &str,
    amount: u128,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO token_holders (chain_id, token_id, address, amount, date_updated)
        VALUES ($1, $2, $3, $4::NUMERIC, $5)
        ON CONFLICT (token_id, address) DO UPDATE SET
            amount = token_holders.amount + EXCLUDED.amount,
            date_updated = EXCLUDED.date_updated
        "#,
    )
    .bind(chain_id)
    .bind(token_id)
    .bind(address)
    .bind(amount.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Debit an address. Returns `false` when the balance does not cover the
/// amount; the guard in the WHERE clause keeps balances non-negative even
/// if a caller forgets to check first.
pub async fn debit_holder(
    conn: &mut PgConnection,
    token_id: i64,
    address: &str,
    amount: u128,
    now: DateTime<Utc>,
) -> StorageResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE token_holders
        SET amount = amount - $3::NUMERIC, date_updated = $4
        WHERE token_id = $1 AND address = $2 AND amount >= $3::NUMERIC
        "#,
    )
    .bind(token_id)
    .bind(address)
    .bind(amount.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}

/// Set a token's circulating supply.
pub async fn update_supply(
    conn: &mut PgConnection,
    token_id: i64,
    circulating_supply: u128,
) -> StorageResult<()> {
    sqlx::query("UPDATE tokens SET circulating_supply = $2::NUMERIC WHERE id = $1")
        .bind(token_id)
        .bind(circulating_supply.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Update the marketplace-driven price columns after a fill.
pub async fn update_market_stats(
    conn: &mut PgConnection,
    token_id: i64,
    last_price_base: u128,
    volume_24_base: u128,
) -> StorageResult<()> {
    sqlx::query(
        "UPDATE tokens SET last_price_base = $2::NUMERIC, volume_24_base = $3::NUMERIC WHERE id = $1",
    )
    .bind(token_id)
    .bind(last_price_base.to_string())
    .bind(volume_24_base.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Append a token movement history row.
pub async fn insert_history(
    conn: &mut PgConnection,
    chain_id: &str,
    token_id: i64,
    transaction_id: i64,
    sender: &str,
    receiver: Option<&str>,
    action: TokenAction,
    amount: u128,
    height: u64,
    date_created: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO token_address_history (
            chain_id, token_id, transaction_id, sender, receiver, action,
            amount, height, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8, $9)
        "#,
    )
    .bind(chain_id)
    .bind(token_id)
    .bind(transaction_id)
    .bind(sender)
    .bind(receiver)
    .bind(action.as_str())
    .bind(amount.to_string())
    .bind(height as i64)
    .bind(date_created)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Append a fill to the token trade history (price charting data).
#[allow(clippy::too_many_arguments)]
pub async fn insert_trade(
    conn: &mut PgConnection,
    chain_id: &str,
    token_id: i64,
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
        INSERT INTO token_trade_history (
            chain_id, token_id, transaction_id, seller_address, buyer_address,
            amount_base, amount_quote, rate, total_usd, height, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, $7::NUMERIC, $8::NUMERIC, $9, $10, $11)
        "#,
    )
    .bind(chain_id)
    .bind(token_id)
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

/// Base-token volume traded over the 24 hours leading up to `now`.
///
/// The rolling `tokens.volume_24_base` column is refreshed from this sum on
/// every fill, which both adds the new fill and drops entries older than
/// the window.
pub async fn volume_in_window(
    conn: &mut PgConnection,
    token_id: i64,
    now: DateTime<Utc>,
) -> StorageResult<u128> {
    let row: (Option<String>,) = sqlx::query_as(
        r#"
        SELECT SUM(amount_base)::NUMERIC(39,0)::TEXT
        FROM token_trade_history
        WHERE token_id = $1 AND date_created > $2 - INTERVAL '24 hours'
        "#,
    )
    .bind(token_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    match row.0 {
        Some(sum) => parse_numeric(&sum, "token_trade_history.volume"),
        None => Ok(0),
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: i64,
    chain_id: String,
    height: i64,
    version: String,
    transaction_id: i64,
    ticker: String,
    name: String,
    decimals: i32,
    max_supply: String,
    per_mint_limit: String,
    launch_height: i64,
    circulating_supply: String,
    last_price_base: String,
    volume_24_base: String,
    creator: String,
    current_owner: String,
    mint_page: String,
    metadata: Option<serde_json::Value>,
    content_path: Option<String>,
    is_explicit: bool,
    date_created: DateTime<Utc>,
}

impl TokenRow {
    fn into_token(self) -> StorageResult<Token> {
        Ok(Token {
            id: self.id,
            chain_id: self.chain_id,
            height: self.height as u64,
            version: self.version,
            transaction_id: self.transaction_id,
            ticker: self.ticker,
            name: self.name,
            decimals: self.decimals as u32,
            max_supply: parse_numeric(&self.max_supply, "tokens.max_supply")?,
            per_mint_limit: parse_numeric(&self.per_mint_limit, "tokens.per_mint_limit")?,
            launch_height: self.launch_height as u64,
            circulating_supply: parse_numeric(
                &self.circulating_supply,
                "tokens.circulating_supply",
            )?,
            last_price_base: parse_numeric(&self.last_price_base, "tokens.last_price_base")?,
            volume_24_base: parse_numeric(&self.volume_24_base, "tokens.volume_24_base")?,
            creator: self.creator,
            current_owner: self.current_owner,
            mint_page: self.mint_page,
            metadata: self.metadata,
            content_path: self.content_path,
            is_explicit: self.is_explicit,
            date_created: self.date_created,
        })
    }
}
