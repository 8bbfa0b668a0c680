//! Processor for the marketplace metaprotocol.
//!
//! # Supported Operations
//!
//! - `list.inscription` / `list.cft20` - create a listing (CFT-20 lots are
//!   escrowed by debiting the seller)
//! - `deposit` - reserve a listing for a buyer
//! - `buy` - settle a reserved listing
//! - `delist` - cancel a listing, releasing any escrow
//!
//! The per-height timeout sweeper lives here too, as the protocol's
//! height-end hook: lapsed deposits put their listing back to OPEN.

use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::debug;

use meteorite_core::error::{ProtocolError, ProtocolResult, StorageResult};
use meteorite_core::metrics::record_listings_timed_out;
use meteorite_core::models::{InscriptionAction, ListingAction, MarketplaceListing, TokenAction};
use meteorite_core::ports::{MetaprotocolHandler, TxContext};

use crate::cft20::storage as tokens;
use crate::inscription::storage as inscriptions;
use crate::utils::{normalize_ticker, optional_u64, pow10, require_amount, require_u64};

use super::storage;
use super::storage::NewListing;

/// Reservation windows shorter than this are rejected at list time.
const MIN_DEPOSIT_TIMEOUT: u64 = 50;

/// Configuration for the marketplace processor.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Reservation window in blocks when a listing omits `to`.
    pub default_deposit_timeout: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            default_deposit_timeout: 100,
        }
    }
}

/// Asking price of a CFT-20 lot: `amount * ppt / 10^decimals`, rounded down.
fn listing_total(amount: u128, ppt: u128, decimals: u32) -> ProtocolResult<u128> {
    let total = amount
        .checked_mul(ppt)
        .ok_or(ProtocolError::InvalidAmount)?
        / pow10(decimals);
    if total == 0 {
        return Err(ProtocolError::InvalidAmount);
    }
    Ok(total)
}

/// Processor for the marketplace metaprotocol.
pub struct MarketplaceHandler {
    config: MarketplaceConfig,
}

impl MarketplaceHandler {
    pub fn new(config: MarketplaceConfig) -> Self {
        Self { config }
    }

    /// Reservation window for a new listing: the `to` parameter when given
    /// (floored), the configured default otherwise.
    fn deposit_timeout(&self, ctx: &TxContext<'_>) -> ProtocolResult<u64> {
        match optional_u64(ctx.urn, "to")? {
            Some(timeout) if timeout < MIN_DEPOSIT_TIMEOUT => {
                Err(ProtocolError::InvalidParameter {
                    key: "to",
                    reason: format!("deposit timeout must be at least {} blocks", MIN_DEPOSIT_TIMEOUT),
                })
            }
            Some(timeout) => Ok(timeout),
            None => Ok(self.config.default_deposit_timeout),
        }
    }

    async fn create_listing(
        &self,
        conn: &mut PgConnection,
        ctx: &TxContext<'_>,
        total: u128,
    ) -> ProtocolResult<MarketplaceListing> {
        let deposit_total = match optional_u64(ctx.urn, "dep")? {
            Some(dep) => dep as u128,
            None => 0,
        };

        let listing = storage::insert_listing(
            conn,
            &NewListing {
                chain_id: ctx.chain_id.to_string(),
                seller_address: ctx.sender.to_string(),
                total,
                deposit_total,
                deposit_timeout: self.deposit_timeout(ctx)?,
                transaction_id: ctx.transaction.id,
                date_created: ctx.transaction.date_created,
            },
        )
        .await?;

        storage::insert_listing_history(
            conn,
            listing.id,
            ctx.sender,
            ListingAction::List,
            ctx.transaction.id,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        Ok(listing)
    }

    /// `list.inscription$h=<content-hash>,amt=<base total>[,to=..][,dep=..]`
    async fn list_inscription(
        &self,
        conn: &mut PgConnection,
        ctx: &TxContext<'_>,
    ) -> ProtocolResult<()> {
        let content_hash = ctx.urn.require("h")?.to_lowercase();
        let total = require_amount(ctx.urn, "amt")?;

        let inscription = inscriptions::get_by_content_hash(conn, ctx.chain_id, &content_hash)
            .await?
            .ok_or_else(|| ProtocolError::InscriptionNotFound(content_hash.clone()))?;

        if inscription.current_owner != ctx.sender {
            return Err(ProtocolError::NotOwner("inscription"));
        }
        if storage::inscription_has_live_listing(conn, inscription.id).await? {
            return Err(ProtocolError::ListingLive);
        }

        let listing = self.create_listing(conn, ctx, total).await?;
        storage::insert_inscription_detail(conn, listing.id, inscription.id).await?;

        // Ownership does not move; the live listing is the escrow.
        inscriptions::insert_history(
            conn,
            ctx.chain_id,
            inscription.id,
            ctx.transaction.id,
            ctx.sender,
            None,
            InscriptionAction::List,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        debug!(listing = listing.id, inscription = inscription.id, "Inscription listed");
        Ok(())
    }

    /// `list.cft20$tic=...,amt=...,ppt=...[,to=..][,dep=..]`
    async fn list_cft20(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let ticker = normalize_ticker(ctx.urn.require("tic")?);
        let amount = require_amount(ctx.urn, "amt")?;
        let ppt = require_amount(ctx.urn, "ppt")?;

        let token = tokens::get_by_ticker(conn, ctx.chain_id, &ticker)
            .await?
            .ok_or_else(|| ProtocolError::TokenNotFound(ticker.clone()))?;

        let total = listing_total(amount, ppt, token.decimals)?;

        // The debit is the escrow; the seller's missing balance is held by
        // the listing until a fill or a delist.
        let debited = tokens::debit_holder(
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

        let listing = self.create_listing(conn, ctx, total).await?;
        storage::insert_cft20_detail(conn, listing.id, token.id, amount, ppt).await?;

        tokens::insert_history(
            conn,
            ctx.chain_id,
            token.id,
            ctx.transaction.id,
            ctx.sender,
            None,
            TokenAction::List,
            amount,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        debug!(listing = listing.id, ticker = %token.ticker, amount = %amount, "CFT-20 lot listed");
        Ok(())
    }

    /// `deposit$lid=<listing id>`
    async fn deposit(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let listing_id = require_u64(ctx.urn, "lid")? as i64;

        let listing = storage::get_listing(conn, listing_id)
            .await?
            .ok_or_else(|| ProtocolError::ListingNotFound(listing_id.to_string()))?;

        if !listing.is_live() {
            return Err(ProtocolError::ListingClosed);
        }
        if listing.is_deposited {
            return Err(ProtocolError::ListingReserved);
        }
        if listing.seller_address == ctx.sender {
            return Err(ProtocolError::SelfDeposit);
        }

        let timedout_block = ctx.transaction.height + listing.deposit_timeout;
        storage::set_deposit(
            conn,
            listing.id,
            ctx.sender,
            timedout_block,
            ctx.transaction.date_created,
        )
        .await?;
        storage::insert_listing_history(
            conn,
            listing.id,
            ctx.sender,
            ListingAction::Deposit,
            ctx.transaction.id,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        Ok(())
    }

    /// `buy$lid=<listing id>`
    async fn buy(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let listing_id = require_u64(ctx.urn, "lid")? as i64;

        let listing = storage::get_listing(conn, listing_id)
            .await?
            .ok_or_else(|| ProtocolError::ListingNotFound(listing_id.to_string()))?;

        if !listing.is_live() {
            return Err(ProtocolError::ListingClosed);
        }
        if !listing.is_deposited || listing.depositor_address.as_deref() != Some(ctx.sender) {
            return Err(ProtocolError::NotDepositor);
        }
        if let Some(timedout_block) = listing.depositor_timedout_block {
            if ctx.transaction.height > timedout_block {
                return Err(ProtocolError::DepositTimedOut);
            }
        }

        storage::set_filled(conn, listing.id, ctx.transaction.date_created).await?;

        let usd_rate = storage::base_token_usd(conn, ctx.chain_id).await?;
        let total_usd = listing.total as f64 * usd_rate;

        if let Some(detail) = storage::get_inscription_detail(conn, listing.id).await? {
            self.settle_inscription(conn, ctx, &listing, detail.inscription_id, total_usd)
                .await?;
        } else if let Some(detail) = storage::get_cft20_detail(conn, listing.id).await? {
            self.settle_cft20(conn, ctx, &listing, &detail, total_usd)
                .await?;
        } else {
            return Err(ProtocolError::ListingNotFound(format!(
                "{} has no sidecar",
                listing.id
            )));
        }

        storage::insert_listing_history(
            conn,
            listing.id,
            ctx.sender,
            ListingAction::Buy,
            ctx.transaction.id,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        debug!(listing = listing.id, buyer = %ctx.sender, "Listing filled");
        Ok(())
    }

    async fn settle_inscription(
        &self,
        conn: &mut PgConnection,
        ctx: &TxContext<'_>,
        listing: &MarketplaceListing,
        inscription_id: i64,
        total_usd: f64,
    ) -> ProtocolResult<()> {
        inscriptions::update_owner(conn, inscription_id, ctx.sender).await?;
        inscriptions::insert_history(
            conn,
            ctx.chain_id,
            inscription_id,
            ctx.transaction.id,
            &listing.seller_address,
            Some(ctx.sender),
            InscriptionAction::Buy,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;
        storage::insert_inscription_trade(
            conn,
            ctx.chain_id,
            inscription_id,
            ctx.transaction.id,
            &listing.seller_address,
            ctx.sender,
            listing.total,
            total_usd,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        Ok(())
    }

    async fn settle_cft20(
        &self,
        conn: &mut PgConnection,
        ctx: &TxContext<'_>,
        listing: &MarketplaceListing,
        detail: &meteorite_core::models::MarketplaceCft20Detail,
        total_usd: f64,
    ) -> ProtocolResult<()> {
        // The escrowed amount was debited at list time; it lands with the buyer.
        tokens::credit_holder(
            conn,
            ctx.chain_id,
            detail.token_id,
            ctx.sender,
            detail.amount,
            ctx.transaction.date_created,
        )
        .await?;
        tokens::insert_history(
            conn,
            ctx.chain_id,
            detail.token_id,
            ctx.transaction.id,
            &listing.seller_address,
            Some(ctx.sender),
            TokenAction::Transfer,
            detail.amount,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        tokens::insert_trade(
            conn,
            ctx.chain_id,
            detail.token_id,
            ctx.transaction.id,
            &listing.seller_address,
            ctx.sender,
            listing.total,
            detail.amount,
            detail.ppt,
            total_usd,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;
        storage::insert_cft20_trade(
            conn,
            ctx.chain_id,
            listing.id,
            ctx.transaction.id,
            &listing.seller_address,
            ctx.sender,
            listing.total,
            detail.amount,
            detail.ppt,
            total_usd,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        // Refresh the price columns: the 24h window naturally includes the
        // fill just inserted and drops anything older.
        let volume = tokens::volume_in_window(
            conn,
            detail.token_id,
            ctx.transaction.date_created,
        )
        .await?;
        tokens::update_market_stats(conn, detail.token_id, detail.ppt, volume).await?;

        Ok(())
    }

    /// `delist$lid=<listing id>`
    async fn delist(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let listing_id = require_u64(ctx.urn, "lid")? as i64;

        let listing = storage::get_listing(conn, listing_id)
            .await?
            .ok_or_else(|| ProtocolError::ListingNotFound(listing_id.to_string()))?;

        if listing.seller_address != ctx.sender {
            return Err(ProtocolError::NotOwner("listing"));
        }
        if !listing.is_live() {
            return Err(ProtocolError::ListingClosed);
        }

        storage::set_cancelled(conn, listing.id, ctx.transaction.date_created).await?;

        if let Some(detail) = storage::get_cft20_detail(conn, listing.id).await? {
            // Return the escrow to the seller.
            tokens::credit_holder(
                conn,
                ctx.chain_id,
                detail.token_id,
                &listing.seller_address,
                detail.amount,
                ctx.transaction.date_created,
            )
            .await?;
            tokens::insert_history(
                conn,
                ctx.chain_id,
                detail.token_id,
                ctx.transaction.id,
                ctx.sender,
                None,
                TokenAction::Delist,
                detail.amount,
                ctx.transaction.height,
                ctx.transaction.date_created,
            )
            .await?;
        } else if let Some(detail) = storage::get_inscription_detail(conn, listing.id).await? {
            inscriptions::insert_history(
                conn,
                ctx.chain_id,
                detail.inscription_id,
                ctx.transaction.id,
                ctx.sender,
                None,
                InscriptionAction::Delist,
                ctx.transaction.height,
                ctx.transaction.date_created,
            )
            .await?;
        }

        storage::insert_listing_history(
            conn,
            listing.id,
            ctx.sender,
            ListingAction::Delist,
            ctx.transaction.id,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MetaprotocolHandler for MarketplaceHandler {
    fn name(&self) -> &'static str {
        "marketplace"
    }

    async fn process(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        match ctx.urn.operation.as_str() {
            "list.inscription" => self.list_inscription(conn, ctx).await,
            "list.cft20" => self.list_cft20(conn, ctx).await,
            "deposit" => self.deposit(conn, ctx).await,
            "buy" => self.buy(conn, ctx).await,
            "delist" => self.delist(conn, ctx).await,
            other => Err(ProtocolError::UnknownOperation(other.to_string())),
        }
    }

    /// The timeout sweeper: lapsed deposits put their listing back to OPEN.
    async fn on_height_end(&self, conn: &mut PgConnection, height: u64) -> StorageResult<()> {
        let expired = storage::expire_deposits(conn, height, chrono::Utc::now()).await?;
        if expired.is_empty() {
            return Ok(());
        }

        for deposit in &expired {
            storage::insert_listing_history(
                conn,
                deposit.listing_id,
                &deposit.depositor_address,
                ListingAction::Timeout,
                deposit.transaction_id,
                height,
                chrono::Utc::now(),
            )
            .await?;
        }

        debug!(height, released = expired.len(), "Deposits timed out");
        record_listings_timed_out(expired.len() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_total_rounds_down() {
        // 100 unités à ppt=2 avec 0 décimale
        assert_eq!(listing_total(100, 2, 0).unwrap(), 200);
        // 1.5 jeton entier à ppt=2: 1500000 * 2 / 10^6 = 3
        assert_eq!(listing_total(1_500_000, 2, 6).unwrap(), 3);
        // arrondi vers le bas
        assert_eq!(listing_total(1_499_999, 2, 6).unwrap(), 2);
    }

    #[test]
    fn listing_total_rejects_zero_and_overflow() {
        // prix nul après arrondi
        assert!(matches!(
            listing_total(1, 1, 6),
            Err(ProtocolError::InvalidAmount)
        ));
        // multiplication hors domaine
        assert!(matches!(
            listing_total(u128::MAX, 2, 0),
            Err(ProtocolError::InvalidAmount)
        ));
    }

    #[test]
    fn default_timeout_applies() {
        let config = MarketplaceConfig::default();
        assert_eq!(config.default_deposit_timeout, 100);
        assert!(MIN_DEPOSIT_TIMEOUT <= config.default_deposit_timeout);
    }
}
