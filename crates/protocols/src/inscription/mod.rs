//! Inscription metaprotocol bundle.
//!
//! Content inscriptions anchored to the chain by their SHA-256 digest.
//! The content itself lives in the payload store; the relational side
//! keeps the digest, ownership, and history.
//!
//! # Operations
//!
//! - `inscribe` - create an inscription from an attached content blob
//! - `transfer` - hand an inscription to a new owner
//!
//! # Database Tables
//!
//! - `inscriptions` - current inscription state and ownership
//! - `inscription_history` - append-only operation log

mod handler;
pub mod storage;

use std::sync::Arc;

use meteorite_core::ports::{MetaprotocolHandler, PayloadStore};

use crate::ProtocolBundle;

pub use handler::InscriptionHandler;
pub use storage::NewInscription;

/// SQL migrations for the inscription bundle.
pub const MIGRATIONS: &[&str] = &[
    // Migration 0: inscription state and history
    r#"
CREATE TABLE inscriptions (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    height BIGINT NOT NULL,
    version TEXT NOT NULL,
    transaction_id BIGINT NOT NULL UNIQUE REFERENCES transactions(id) ON DELETE CASCADE,
    content_hash TEXT NOT NULL UNIQUE,
    creator TEXT NOT NULL,
    current_owner TEXT NOT NULL,
    content_type TEXT NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}',
    content_path TEXT NOT NULL,
    content_size_bytes BIGINT NOT NULL,
    is_explicit BOOLEAN NOT NULL DEFAULT FALSE,
    date_created TIMESTAMPTZ NOT NULL
);

CREATE INDEX idx_inscriptions_owner ON inscriptions(current_owner);
CREATE INDEX idx_inscriptions_height ON inscriptions(height);

CREATE TABLE inscription_history (
    id BIGSERIAL PRIMARY KEY,
    chain_id TEXT NOT NULL,
    inscription_id BIGINT NOT NULL REFERENCES inscriptions(id) ON DELETE CASCADE,
    transaction_id BIGINT NOT NULL UNIQUE REFERENCES transactions(id) ON DELETE CASCADE,
    sender TEXT NOT NULL,
    receiver TEXT,
    action TEXT NOT NULL,
    height BIGINT NOT NULL,
    date_created TIMESTAMPTZ NOT NULL
);

CREATE INDEX idx_inscription_history_inscription ON inscription_history(inscription_id);
"#,
];

/// Bundle for the inscription metaprotocol.
pub struct InscriptionBundle {
    store: Arc<dyn PayloadStore>,
}

impl InscriptionBundle {
    pub fn new(store: Arc<dyn PayloadStore>) -> Self {
        Self { store }
    }
}

impl ProtocolBundle for InscriptionBundle {
    fn name(&self) -> &'static str {
        "inscription"
    }

    fn handlers(&self) -> Vec<Arc<dyn MetaprotocolHandler>> {
        vec![Arc::new(InscriptionHandler::new(self.store.clone()))]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn priority(&self) -> i32 {
        // Inscriptions exist before anything references them
        100
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &["inscription_history", "inscriptions"]
    }
}
