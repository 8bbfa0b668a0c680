//! Port trait for the blockchain data source.
//!
//! This trait defines the narrow interface the pipeline needs from a chain
//! node: fetch a block at a height with its decoded transactions, report the
//! latest height, and resolve a transaction's sender address. Implementations
//! live in the infrastructure layer (e.g. `meteorite-chain`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ChainResult;

/// A block with its decoded transactions, in chain order.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Block height.
    pub height: u64,
    /// Block time from the header.
    pub time: DateTime<Utc>,
    /// Transactions in the order they appear in the block.
    pub transactions: Vec<RawTransaction>,
}

/// A decoded chain transaction as the pipeline sees it.
///
/// The memo carries the metaprotocol URN; inscribe operations additionally
/// attach their content bytes out-of-band in the transaction envelope.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    /// Transaction hash (upper-case hex).
    pub hash: String,
    /// Memo field, candidate URN string.
    pub memo: String,
    /// Decoded messages as JSON, used for sender resolution.
    pub messages: Vec<serde_json::Value>,
    /// Attached inscription content, if the envelope carries one.
    pub payload: Option<Vec<u8>>,
    /// Gas consumed by execution.
    pub gas_used: u64,
    /// Fee string as paid, e.g. "1500uatom".
    pub fees: String,
    /// Full transaction body as JSON text, persisted verbatim.
    pub content: String,
}

/// Port trait for the blockchain data source.
///
/// The pipeline pulls: it asks for one height at a time and requires blocks
/// to be delivered in height order. Implementations may prefetch internally
/// but ordering is the pipeline's contract.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Chain ID reported by the connected node.
    async fn chain_id(&self) -> ChainResult<String>;

    /// Latest height the node has.
    async fn latest_height(&self) -> ChainResult<u64>;

    /// Fetch block at `height` with decoded transactions.
    async fn block(&self, height: u64) -> ChainResult<RawBlock>;

    /// Resolve the bech32 sender address of a transaction.
    fn sender_address(&self, tx: &RawTransaction) -> ChainResult<String>;
}
