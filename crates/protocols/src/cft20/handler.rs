//! Processor for the CFT-20 fungible token metaprotocol.
//!
//! # Supported Operations
//!
//! - `deploy`: create a token with a unique ticker and supply caps
//! - `mint`: mint into the sender's balance, clamped to the per-mint limit
//!   and the remaining supply
//! - `transfer`: move balance between addresses

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::debug;

use meteorite_core::error::{ProtocolError, ProtocolResult};
use meteorite_core::models::TokenAction;
use meteorite_core::ports::{MetaprotocolHandler, PayloadStore, TxContext};

use crate::utils::{normalize_ticker, optional_u64, require_amount};

use super::storage;
use super::storage::NewToken;

/// Tickers are 1 to 10 characters.
const MAX_TICKER_LEN: usize = 10;
/// Token precision is capped so listing math stays in range.
const MAX_DECIMALS: u32 = 6;
const DEFAULT_DECIMALS: u32 = 6;

/// How much a mint may actually create: the requested amount clamped to the
/// per-mint limit and to what is left under the max supply. `None` means the
/// token is sold out.
fn clamp_mint(
    requested: u128,
    per_mint_limit: u128,
    max_supply: u128,
    circulating_supply: u128,
) -> Option<u128> {
    let remaining = max_supply.saturating_sub(circulating_supply);
    if remaining == 0 {
        return None;
    }
    Some(requested.min(per_mint_limit).min(remaining))
}

/// Processor for the CFT-20 metaprotocol.
pub struct Cft20Handler {
    store: Arc<dyn PayloadStore>,
}

impl Cft20Handler {
    pub fn new(store: Arc<dyn PayloadStore>) -> Self {
        Self { store }
    }

    /// `deploy$nam=...,tic=...,sup=...,dec=...,lim=...,opn=...`
    async fn deploy(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let ticker = normalize_ticker(ctx.urn.require("tic")?);
        if ticker.is_empty() || ticker.len() > MAX_TICKER_LEN {
            return Err(ProtocolError::InvalidParameter {
                key: "tic",
                reason: format!("ticker must be 1 to {} characters", MAX_TICKER_LEN),
            });
        }

        let max_supply = require_amount(ctx.urn, "sup")?;
        let per_mint_limit = require_amount(ctx.urn, "lim")?;
        if per_mint_limit > max_supply {
            return Err(ProtocolError::InvalidParameter {
                key: "lim",
                reason: "per-mint limit exceeds max supply".to_string(),
            });
        }

        let decimals = match optional_u64(ctx.urn, "dec")? {
            Some(dec) if dec > MAX_DECIMALS as u64 => {
                return Err(ProtocolError::InvalidParameter {
                    key: "dec",
                    reason: format!("decimals are capped at {}", MAX_DECIMALS),
                });
            }
            Some(dec) => dec as u32,
            None => DEFAULT_DECIMALS,
        };

        let launch_height = optional_u64(ctx.urn, "opn")?.unwrap_or(0);
        let name = ctx
            .urn
            .param("nam")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&ticker)
            .to_string();

        if storage::get_by_ticker(conn, ctx.chain_id, &ticker)
            .await?
            .is_some()
        {
            return Err(ProtocolError::DuplicateTicker(ticker));
        }

        // An attached blob is the token logo.
        let content_path = match ctx.raw.payload.as_deref() {
            Some(logo) => {
                let mime = ctx.urn.param("mt").unwrap_or("image/png");
                Some(self.store.put(logo, mime).await?)
            }
            None => None,
        };

        let token = storage::insert(
            conn,
            &NewToken {
                chain_id: ctx.chain_id.to_string(),
                height: ctx.transaction.height,
                version: ctx.urn.version.clone(),
                transaction_id: ctx.transaction.id,
                ticker,
                name,
                decimals,
                max_supply,
                per_mint_limit,
                launch_height,
                creator: ctx.sender.to_string(),
                mint_page: "default".to_string(),
                metadata: None,
                content_path,
                date_created: ctx.transaction.date_created,
            },
        )
        .await?;

        debug!(ticker = %token.ticker, max_supply = %token.max_supply, "Token deployed");
        Ok(())
    }

    /// `mint$tic=...,amt=...`
    async fn mint(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let ticker = normalize_ticker(ctx.urn.require("tic")?);
        let requested = require_amount(ctx.urn, "amt")?;

        let token = storage::get_by_ticker(conn, ctx.chain_id, &ticker)
            .await?
            .ok_or_else(|| ProtocolError::TokenNotFound(ticker.clone()))?;

        if ctx.transaction.height < token.launch_height {
            return Err(ProtocolError::NotLaunched);
        }

        let minted = clamp_mint(
            requested,
            token.per_mint_limit,
            token.max_supply,
            token.circulating_supply,
        )
        .ok_or(ProtocolError::SoldOut)?;

        storage::credit_holder(
            conn,
            ctx.chain_id,
            token.id,
            ctx.sender,
            minted,
            ctx.transaction.date_created,
        )
        .await?;
        storage::update_supply(conn, token.id, token.circulating_supply + minted).await?;
        storage::insert_history(
            conn,
            ctx.chain_id,
            token.id,
            ctx.transaction.id,
            ctx.sender,
            Some(ctx.sender),
            TokenAction::Mint,
            minted,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        debug!(ticker = %token.ticker, minted = %minted, "Tokens minted");
        Ok(())
    }

    /// `transfer$tic=...,amt=...,dst=...`
    async fn transfer(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let ticker = normalize_ticker(ctx.urn.require("tic")?);
        let amount = require_amount(ctx.urn, "amt")?;
        let destination = ctx.urn.require("dst")?;

        let token = storage::get_by_ticker(conn, ctx.chain_id, &ticker)
            .await?
            .ok_or_else(|| ProtocolError::TokenNotFound(ticker.clone()))?;

        let debited = storage::debit_holder(
            conn,
            token.id,
            ctx.sender,
            amount,
            ctx.transaction.date_created,
        )
        .await?;
        if !debited {
            return Err(ProtocolError::InsufficientBalance);
        }

        storage::credit_holder(
            conn,
            ctx.chain_id,
            token.id,
            destination,
            amount,
            ctx.transaction.date_created,
        )
        .await?;
        storage::insert_history(
            conn,
            ctx.chain_id,
            token.id,
            ctx.transaction.id,
            ctx.sender,
            Some(destination),
            TokenAction::Transfer,
            amount,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MetaprotocolHandler for Cft20Handler {
    fn name(&self) -> &'static str {
        "cft20"
    }

    async fn process(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        match ctx.urn.operation.as_str() {
            "deploy" => self.deploy(conn, ctx).await,
            "mint" => self.mint(conn, ctx).await,
            "transfer" => self.transfer(conn, ctx).await,
            other => Err(ProtocolError::UnknownOperation(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scénario de référence: sup=100, lim=30, trois mints de 40
    #[test]
    fn mint_clamps_to_per_mint_limit() {
        assert_eq!(clamp_mint(40, 30, 100, 0), Some(30));
        assert_eq!(clamp_mint(40, 30, 100, 30), Some(30));
        assert_eq!(clamp_mint(40, 30, 100, 60), Some(30));
    }

    #[test]
    fn mint_clamps_to_remaining_supply() {
        // 90 déjà en circulation: il ne reste que 10
        assert_eq!(clamp_mint(40, 30, 100, 90), Some(10));
    }

    #[test]
    fn mint_fails_when_sold_out() {
        assert_eq!(clamp_mint(40, 30, 100, 100), None);
        assert_eq!(clamp_mint(1, 30, 100, 100), None);
    }

    #[test]
    fn small_mints_pass_through_unclamped() {
        assert_eq!(clamp_mint(5, 30, 100, 0), Some(5));
        assert_eq!(clamp_mint(30, 30, 100, 0), Some(30));
    }

    #[test]
    fn clamp_handles_overminted_supply() {
        // circulating > max ne doit jamais arriver, mais la saturation
        // garantit l'absence de panique
        assert_eq!(clamp_mint(10, 30, 100, 150), None);
    }
}
