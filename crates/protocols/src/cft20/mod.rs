//! CFT-20 fungible token metaprotocol bundle.
//!
//! # Operations
//!
//! - `deploy` - create a token (unique upper-case ticker, supply caps)
//! - `mint` - mint into the sender's balance, clamped to the per-mint
//!   limit and the remaining supply
//! - `transfer` - move balance between addresses
//!
//! # Database Tables
//!
//! - `tokens` - token state, supply and marketplace price columns
//! - `token_holders` - per-address balances
//! - `token_address_history` - append-only movement log
//! - `token_trade_history` - append-only marketplace fills (charting)
//!
//! # Invariants
//!
//! For every token: `circulating_supply <= max_supply`, and the sum of
//! holder balances plus amounts escrowed in live CFT-20 listings equals
//! `circulating_supply`.

mod handler;
pub mod storage;

use std::sync::Arc;

use meteorite_core::ports::{MetaprotocolHandler, PayloadStore};

use crate::ProtocolBundle;

pub use handler::Cft20Handler;
pub use storage::NewToken;

/// SQL migrations for the CFT-20 bundle.
pub const MIGRATIONS: &[&str] = &[
    // Migration 0: tokens, holders and history
    r#"
CREATE TABLE tokens (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    height BIGINT NOT NULL,
    version TEXT NOT NULL,
    transaction_id BIGINT NOT NULL UNIQUE REFERENCES transactions(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    name TEXT NOT NULL,
    decimals INTEGER NOT NULL,
    max_supply NUMERIC(39, 0) NOT NULL,
    per_mint_limit NUMERIC(39, 0) NOT NULL,
    launch_height BIGINT NOT NULL DEFAULT 0,
    circulating_supply NUMERIC(39, 0) NOT NULL DEFAULT 0,
    last_price_base NUMERIC(39, 0) NOT NULL DEFAULT 0,
    volume_24_base NUMERIC(39, 0) NOT NULL DEFAULT 0,
    creator TEXT NOT NULL,
    current_owner TEXT NOT NULL,
    mint_page TEXT NOT NULL DEFAULT 'default',
    metadata JSONB,
    content_path TEXT,
    is_explicit BOOLEAN NOT NULL DEFAULT FALSE,
    date_created TIMESTAMPTZ NOT NULL,
    UNIQUE (chain_id, ticker)
);

CREATE TABLE token_holders (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    token_id BIGINT NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    address TEXT NOT NULL,
    amount NUMERIC(39, 0) NOT NULL DEFAULT 0 CHECK (amount >= 0),
    date_updated TIMESTAMPTZ NOT NULL,
    UNIQUE (token_id, address)
);

CREATE INDEX idx_token_holders_address ON token_holders(address);

CREATE TABLE token_address_history (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    token_id BIGINT NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    transaction_id BIGINT NOT NULL UNIQUE REFERENCES transactions(id) ON DELETE CASCADE,
    sender TEXT NOT NULL,
    receiver TEXT,
    action TEXT NOT NULL,
    amount NUMERIC(39, 0) NOT NULL,
    height BIGINT NOT NULL,
    date_created TIMESTAMPTZ NOT NULL
);

CREATE INDEX idx_token_address_history_token ON token_address_history(token_id);

CREATE TABLE token_trade_history (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    token_id BIGINT NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
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

CREATE INDEX idx_token_trade_history_token_date ON token_trade_history(token_id, date_created);
"#,
];

/// Bundle for the CFT-20 metaprotocol.
pub struct Cft20Bundle {
    store: Arc<dyn PayloadStore>,
}

impl Cft20Bundle {
    pub fn new(store: Arc<dyn PayloadStore>) -> Self {
        Self { store }
    }
}

impl ProtocolBundle for Cft20Bundle {
    fn name(&self) -> &'static str {
        "cft20"
    }

    fn handlers(&self) -> Vec<Arc<dyn MetaprotocolHandler>> {
        vec![Arc::new(Cft20Handler::new(self.store.clone()))]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn priority(&self) -> i32 {
        // Tokens exist before the marketplace and bridge reference them
        90
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &[
            "token_trade_history",
            "token_address_history",
            "token_holders",
            "tokens",
        ]
    }
}
