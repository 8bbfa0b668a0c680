//! Processor for the bridge metaprotocol.
//!
//! Single operation: `send`. Debits the sender, records the movement, and
//! produces a signed attestation the counterparty chain mints against.
//! The signature is created and stored last: it is a bearer instrument and
//! must not exist unless the local state already advanced.

use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::debug;

use meteorite_core::error::{ProtocolError, ProtocolResult};
use meteorite_core::models::TokenAction;
use meteorite_core::ports::{MetaprotocolHandler, TxContext};

use crate::cft20::storage as tokens;
use crate::utils::{normalize_ticker, require_amount};

use super::signer::{attestation_bytes, BridgeSigner};
use super::storage;

/// Receiver recorded in token history for bridged-out amounts.
const BRIDGE_RECEIVER: &str = "bridge";

/// Processor for the bridge metaprotocol.
pub struct BridgeHandler {
    signer: BridgeSigner,
}

impl BridgeHandler {
    pub fn new(signer: BridgeSigner) -> Self {
        Self { signer }
    }

    /// `send$tic=...,amt=...,rch=...,rco=...,dst=...`
    async fn send(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        let ticker = normalize_ticker(ctx.urn.require("tic")?);
        let amount_literal = ctx.urn.require("amt")?.to_string();
        let amount = require_amount(ctx.urn, "amt")?;
        let remote_chain_id = ctx.urn.require("rch")?;
        let remote_contract = ctx.urn.require("rco")?;
        let receiver = ctx.urn.require("dst")?;

        let token = tokens::get_by_ticker(conn, ctx.chain_id, &ticker)
            .await?
            .ok_or_else(|| ProtocolError::TokenNotFound(ticker.clone()))?;

        let remote_chain = storage::get_remote_chain(conn, ctx.chain_id, remote_chain_id)
            .await?
            .ok_or_else(|| ProtocolError::RemoteChainNotFound(remote_chain_id.to_string()))?;

        if remote_chain.remote_contract != remote_contract {
            return Err(ProtocolError::RemoteContractMismatch(
                remote_chain_id.to_string(),
            ));
        }

        let enabled = storage::get_bridge_token(conn, remote_chain.id, token.id)
            .await?
            .map(|gate| gate.enabled)
            .unwrap_or(false);
        if !enabled {
            return Err(ProtocolError::BridgeNotEnabled(remote_chain_id.to_string()));
        }

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

        tokens::insert_history(
            conn,
            ctx.chain_id,
            token.id,
            ctx.transaction.id,
            ctx.sender,
            Some(BRIDGE_RECEIVER),
            TokenAction::Bridge,
            amount,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        // A signature is spendable. Create and store it last.
        let attestation = attestation_bytes(
            ctx.chain_id,
            &ctx.transaction.hash,
            &token.ticker,
            &amount_literal,
            remote_chain_id,
            remote_contract,
            receiver,
        );
        let signature = self.signer.sign(&attestation);

        storage::insert_history(
            conn,
            ctx.chain_id,
            token.id,
            ctx.transaction.id,
            ctx.sender,
            receiver,
            amount,
            remote_chain_id,
            remote_contract,
            &signature,
            ctx.transaction.height,
            ctx.transaction.date_created,
        )
        .await?;

        debug!(
            ticker = %token.ticker,
            amount = %amount,
            remote = %remote_chain_id,
            "Bridge send signed"
        );
        Ok(())
    }
}

#[async_trait]
impl MetaprotocolHandler for BridgeHandler {
    fn name(&self) -> &'static str {
        "bridge"
    }

    async fn process(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()> {
        match ctx.urn.operation.as_str() {
            "send" => self.send(conn, ctx).await,
            other => Err(ProtocolError::UnknownOperation(other.to_string())),
        }
    }
}
