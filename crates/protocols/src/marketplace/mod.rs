//! Marketplace metaprotocol bundle.
//!
//! Listings for inscriptions and CFT-20 lots with a deposit/buy flow:
//! OPEN -> RESERVED (deposit) -> FILLED (buy), with delist cancelling and a
//! per-height sweeper releasing lapsed deposits back to OPEN.
//!
//! CFT-20 escrow is logical: listing a lot debits the seller's balance, and
//! the missing balance *is* the escrow until a fill credits the buyer or a
//! delist refunds the seller.
//!
//! # Database Tables
//!
//! - `marketplace_listings` - listing state machine
//! - `marketplace_inscription_details` / `marketplace_cft20_details` -
//!   one-to-one sidecars binding a listing to its asset
//! - `marketplace_listing_history` - append-only listing events
//! - `marketplace_cft20_trade_history` / `inscription_trade_history` -
//!   append-only fills

mod handler;
pub mod storage;

use std::sync::Arc;

use meteorite_core::ports::MetaprotocolHandler;

use crate::ProtocolBundle;

pub use handler::{MarketplaceConfig, MarketplaceHandler};
pub use storage::{ExpiredDeposit, NewListing};

/// SQL migrations for the marketplace bundle.
pub const MIGRATIONS: &[&str] = &[
    // Migration 0: listings, sidecars, history and fills
    r#"
CREATE TABLE marketplace_listings (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    seller_address TEXT NOT NULL,
    total NUMERIC(39, 0) NOT NULL,
    deposit_total NUMERIC(39, 0) NOT NULL DEFAULT 0,
    deposit_timeout BIGINT NOT NULL,
    depositor_address TEXT,
    depositor_timedout_block BIGINT,
    is_deposited BOOLEAN NOT NULL DEFAULT FALSE,
    is_filled BOOLEAN NOT NULL DEFAULT FALSE,
    is_cancelled BOOLEAN NOT NULL DEFAULT FALSE,
    transaction_id BIGINT NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
    date_created TIMESTAMPTZ NOT NULL,
    date_updated TIMESTAMPTZ,
    CHECK (NOT (is_filled AND is_cancelled))
);

CREATE INDEX idx_marketplace_listings_seller ON marketplace_listings(seller_address);
CREATE INDEX idx_marketplace_listings_sweep
    ON marketplace_listings(depositor_timedout_block)
    WHERE is_deposited AND NOT is_filled AND NOT is_cancelled;

CREATE TABLE marketplace_inscription_details (
    id BIGSERIAL PRIMARY KEY,
    listing_id BIGINT NOT NULL UNIQUE REFERENCES marketplace_listings(id) ON DELETE CASCADE,
    inscription_id BIGINT NOT NULL REFERENCES inscriptions(id) ON DELETE CASCADE
);

CREATE INDEX idx_marketplace_inscription_details_inscription
    ON marketplace_inscription_details(inscription_id);

CREATE TABLE marketplace_cft20_details (
    id BIGSERIAL PRIMARY KEY,
    listing_id BIGINT NOT NULL UNIQUE REFERENCES marketplace_listings(id) ON DELETE CASCADE,
    token_id BIGINT NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    amount NUMERIC(39, 0) NOT NULL,
    ppt NUMERIC(39, 0) NOT NULL
);

CREATE INDEX idx_marketplace_cft20_details_token ON marketplace_cft20_details(token_id);

CREATE TABLE marketplace_listing_history (
    id BIGSERIAL PRIMARY KEY,
    listing_id BIGINT NOT NULL REFERENCES marketplace_listings(id) ON DELETE CASCADE,
    sender_address TEXT NOT NULL,
    action TEXT NOT NULL,
    transaction_id BIGINT NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
    height BIGINT NOT NULL,
    date_created TIMESTAMPTZ NOT NULL
);

CREATE INDEX idx_marketplace_listing_history_listing
    ON marketplace_listing_history(listing_id);

CREATE TABLE marketplace_cft20_trade_history (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    listing_id BIGINT NOT NULL REFERENCES marketplace_listings(id) ON DELETE CASCADE,
    transaction_id BIGINT NOT NULL UNIQUE REFERENCES transactions(id) ON DELETE CASCADE,
    seller_address TEXT NOT NULL,
    buyer_address TEXT NOT NULL,
    amount_base NUMERIC(39, 0) NOT NULL,
    amount_quote NUMERIC(39, 0) NOT NULL,
    rate NUMERIC(39, 0) NOT NULL,
    total_usd DOUBLE PRECISION NOT NULL DEFAULT 0,
    height BIGINT NOT NULL,
    date_created TIMESTAMPTZ NOT NULL
);

CREATE TABLE inscription_trade_history (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    inscription_id BIGINT NOT NULL REFERENCES inscriptions(id) ON DELETE CASCADE,
    transaction_id BIGINT NOT NULL UNIQUE REFERENCES transactions(id) ON DELETE CASCADE,
    seller_address TEXT NOT NULL,
    buyer_address TEXT NOT NULL,
    amount_base NUMERIC(39, 0) NOT NULL,
    amount_quote NUMERIC(39, 0) NOT NULL DEFAULT 1,
    rate NUMERIC(39, 0) NOT NULL,
    total_usd DOUBLE PRECISION NOT NULL DEFAULT 0,
    height BIGINT NOT NULL,
    date_created TIMESTAMPTZ NOT NULL
);
"#,
];

/// Bundle for the marketplace metaprotocol.
pub struct MarketplaceBundle {
    config: MarketplaceConfig,
}

impl MarketplaceBundle {
    pub fn new(config: MarketplaceConfig) -> Self {
        Self { config }
    }
}

impl ProtocolBundle for MarketplaceBundle {
    fn name(&self) -> &'static str {
        "marketplace"
    }

    fn handlers(&self) -> Vec<Arc<dyn MetaprotocolHandler>> {
        vec![Arc::new(MarketplaceHandler::new(self.config.clone()))]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn priority(&self) -> i32 {
        // After inscriptions and tokens: sidecars reference both
        50
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &[
            "inscription_trade_history",
            "marketplace_cft20_trade_history",
            "marketplace_listing_history",
            "marketplace_cft20_details",
            "marketplace_inscription_details",
            "marketplace_listings",
        ]
    }
}
