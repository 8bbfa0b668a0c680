//! Storage layer for the bridge metaprotocol.
//!
//! Remote chains and per-token enablement are operator-seeded configuration
//! tables; the indexer only reads them and appends to the history.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use meteorite_core::error::{StorageError, StorageResult};
use meteorite_core::models::{BridgeRemoteChain, BridgeToken};

/// Look up a configured remote chain.
pub async fn get_remote_chain(
    conn: &mut PgConnection,
    chain_id: &str,
    remote_chain_id: &str,
) -> StorageResult<Option<BridgeRemoteChain>> {
    let row: Option<(i64, String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT id, chain_id, remote_chain_id, remote_contract, ibc_channel
        FROM bridge_remote_chains
        WHERE chain_id = $1 AND remote_chain_id = $2
        "#,
    )
    .bind(chain_id)
    .bind(remote_chain_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(row.map(
        |(id, chain_id, remote_chain_id, remote_contract, ibc_channel)| BridgeRemoteChain {
            id,
            chain_id,
            remote_chain_id,
            remote_contract,
            ibc_channel,
        },
    ))
}

/// Look up the enablement gate for a token on a remote chain.
pub async fn get_bridge_token(
    conn: &mut PgConnection,
    remote_chain_id: i64,
    token_id: i64,
) -> StorageResult<Option<BridgeToken>> {
    let row: Option<(i64, i64, i64, bool)> = sqlx::query_as(
        r#"
        SELECT id, remote_chain_id, token_id, enabled
        FROM bridge_tokens
        WHERE remote_chain_id = $1 AND token_id = $2
        "#,
    )
    .bind(remote_chain_id)
    .bind(token_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(row.map(|(id, remote_chain_id, token_id, enabled)| BridgeToken {
        id,
        remote_chain_id,
        token_id,
        enabled,
    }))
}

/// Append a signed bridge send to the history.
#[allow(clippy::too_many_arguments)]
pub async fn insert_history(
    conn: &mut PgConnection,
    chain_id: &str,
    token_id: i64,
    transaction_id: i64,
    sender: &str,
    receiver: &str,
    amount: u128,
    remote_chain_id: &str,
    remote_contract: &str,
    signature: &str,
    height: u64,
    date_created: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO bridge_history (
            chain_id, token_id, transaction_id, sender, receiver, amount,
            remote_chain_id, remote_contract, signature, height, date_created
        )
        VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(chain_id)
    .bind(token_id)
    .bind(transaction_id)
    .bind(sender)
    .bind(receiver)
    .bind(amount.to_string())
    .bind(remote_chain_id)
    .bind(remote_contract)
    .bind(signature)
    .bind(height as i64)
    .bind(date_created)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}
