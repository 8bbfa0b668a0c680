//! Bridge metaprotocol bundle.
//!
//! Signed one-way sends of CFT-20 tokens to configured remote chains. The
//! indexer debits the sender and emits a detached Ed25519 attestation over
//! the send's identifying fields; the counterparty chain verifies it to
//! mint the wrapped representation.
//!
//! # Database Tables
//!
//! - `bridge_remote_chains` - operator-seeded remote chain registry
//! - `bridge_tokens` - per-token enablement gates
//! - `bridge_history` - append-only signed sends

mod handler;
mod signer;
pub mod storage;

use std::sync::Arc;

use meteorite_core::ports::MetaprotocolHandler;

use crate::ProtocolBundle;

pub use handler::BridgeHandler;
pub use signer::{attestation_bytes, BridgeSigner};

/// SQL migrations for the bridge bundle.
pub const MIGRATIONS: &[&str] = &[
    // Migration 0: remote chains, enablement gates and history
    r#"
CREATE TABLE bridge_remote_chains (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    remote_chain_id TEXT NOT NULL,
    remote_contract TEXT NOT NULL,
    ibc_channel TEXT NOT NULL,
    UNIQUE (chain_id, remote_chain_id)
);

CREATE TABLE bridge_tokens (
    id BIGSERIAL PRIMARY KEY,
    remote_chain_id BIGINT NOT NULL REFERENCES bridge_remote_chains(id) ON DELETE CASCADE,
    token_id BIGINT NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    enabled BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (remote_chain_id, token_id)
);

CREATE TABLE bridge_history (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    token_id BIGINT NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    transaction_id BIGINT NOT NULL UNIQUE REFERENCES transactions(id) ON DELETE CASCADE,
    sender TEXT NOT NULL,
    receiver TEXT NOT NULL,
    amount NUMERIC(39, 0) NOT NULL,
    remote_chain_id TEXT NOT NULL,
    remote_contract TEXT NOT NULL,
    signature TEXT NOT NULL,
    height BIGINT NOT NULL,
    date_created TIMESTAMPTZ NOT NULL
);

CREATE INDEX idx_bridge_history_token ON bridge_history(token_id);
"#,
];

/// Bundle for the bridge metaprotocol.
pub struct BridgeBundle {
    signer: BridgeSigner,
}

impl BridgeBundle {
    pub fn new(signer: BridgeSigner) -> Self {
        Self { signer }
    }
}

impl ProtocolBundle for BridgeBundle {
    fn name(&self) -> &'static str {
        "bridge"
    }

    fn handlers(&self) -> Vec<Arc<dyn MetaprotocolHandler>> {
        vec![Arc::new(BridgeHandler::new(self.signer.clone()))]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn priority(&self) -> i32 {
        // After cft20: bridge tables reference tokens
        40
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        // Configuration tables (remote chains, gates) survive a purge;
        // only indexed history is data.
        &["bridge_history"]
    }
}
