//! Processor for the inscription metaprotocol.
//!
//! # Supported Operations
//!
//! - `inscribe`: anchor a content blob to the chain, addressed by its
//!   SHA-256 digest
//! - `transfer`: hand an inscription to a new owner

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgConnection;
use tracing::debug;

use meteorite_core::error::{ProtocolError, ProtocolResult};
use meteorite_core::models::InscriptionAction;
use meteorite_core::ports::{MetaprotocolHandler, PayloadStore, TxContext};

use super::storage;
use super::storage::NewInscription;

/// URN parameters that describe the envelope rather than the inscription;
/// everything else becomes metadata.
const RESERVED_PARAMS: [&str; 2] = ["h", "mt"];

/// Processor for the inscription metaprotocol.
pub struct InscriptionHandler {
    store: Arc<dyn PayloadStore>,
}

impl InscriptionHandler {
    pub fn new(store: Arc<dyn PayloadStore>) -> Self {
        Self { store }
    }

    /// `inscribe$h=<sha256>,mt=<mime>,name=...`: verify the attached blob
    /// against the declared digest, store it, and create the inscription.
    async fn inscribe(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let declared_hash = ctx.urn.require("h")?.to_lowercase();
        let mime = ctx.urn.require("mt")?;

        let content = ctx
            .raw
            .payload
            .as_deref()
            .ok_or(ProtocolError::ContentMissing)?;

        let digest = hex::encode(Sha256::digest(content));
        if digest != declared_hash {
            return Err(ProtocolError::ContentMismatch);
        }

        // The digest is already verified, so identical content always maps
        // to the same path and a replayed put is a no-op.
        if storage::get_by_content_hash(conn, ctx.chain_id, &digest)
            .await?
            .is_some()
        {
            return Err(ProtocolError::DuplicateContent);
        }

        let content_path = self.store.put(content, mime).await?;

        let metadata: serde_json::Map<String, serde_json::Value> = ctx
            .urn
            .params()
            .iter()
            .filter(|(k, _)| !RESERVED_PARAMS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();

        let inscription = storage::insert(
            conn,
            &NewInscription {
                chain_id: ctx.chain_id.to_string(),
                height: ctx.transaction.height,
                version: ctx.urn.version.clone(),
                transaction_id: ctx.transaction.id,
                content_hash: digest,
                creator: ctx.sender.to_string(),
                content_type: mime.to_string(),
                metadata: serde_json::Value::Object(metadata),
                content_path,
                content_size_bytes: content.len() as u64,
                date_created: ctx.transaction.date_created,
            },
        )
        .await?;

        storage::insert_history(
            conn,
            ctx.chain_id,
            inscription.id,
            ctx.transaction.id,
            ctx.sender,
            Some(ctx.sender),
            InscriptionAction::Inscribe,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        debug!(
            hash = %inscription.content_hash,
            bytes = inscription.content_size_bytes,
            "Inscription created"
        );

        Ok(())
    }

    /// `transfer$h=<content-hash>,dst=<address>`: move ownership.
    async fn transfer(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let content_hash = ctx.urn.require("h")?.to_lowercase();
        let destination = ctx.urn.require("dst")?;

        let inscription = storage::get_by_content_hash(conn, ctx.chain_id, &content_hash)
            .await?
            .ok_or_else(|| ProtocolError::InscriptionNotFound(content_hash.clone()))?;

        if inscription.current_owner != ctx.sender {
            return Err(ProtocolError::NotOwner("inscription"));
        }

        // A listed inscription is escrowed by its listing; the transfer has
        // to wait for a delist or a fill.
        if storage::has_live_listing(conn, inscription.id).await? {
            return Err(ProtocolError::ListingLive);
        }

        storage::update_owner(conn, inscription.id, destination).await?;
        storage::insert_history(
            conn,
            ctx.chain_id,
            inscription.id,
            ctx.transaction.id,
            ctx.sender,
            Some(destination),
            InscriptionAction::Transfer,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MetaprotocolHandler for InscriptionHandler {
    fn name(&self) -> &'static str {
        "inscription"
    }

    async fn process(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        match ctx.urn.operation.as_str() {
            "inscribe" => self.inscribe(conn, ctx).await,
            "transfer" => self.transfer(conn, ctx).await,
            other => Err(ProtocolError::UnknownOperation(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Le digest déclaré dans l'URN doit être le SHA-256 exact du contenu
    #[test]
    fn declared_hash_must_match_content_digest() {
        let content = b"meteorite test content";
        let digest = hex::encode(Sha256::digest(content));

        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hex::encode(Sha256::digest(content)));
        assert_ne!(digest, hex::encode(Sha256::digest(b"other content")));
    }

    #[test]
    fn reserved_params_stay_out_of_metadata() {
        assert!(RESERVED_PARAMS.contains(&"h"));
        assert!(RESERVED_PARAMS.contains(&"mt"));
        assert!(!RESERVED_PARAMS.contains(&"name"));
    }
}
