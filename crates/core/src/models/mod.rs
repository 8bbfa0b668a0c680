//! Domain models representing indexed metaprotocol state.
//!
//! These models are storage-agnostic and represent the canonical
//! form of indexed data within the domain layer. They are plain record
//! structs: identity is the primary key, and every mutation flows through
//! a protocol processor or the pipeline checkpoint.
//!
//! All token quantities (supplies, balances, listing totals, unit prices)
//! are `u128`. The backing store keeps them as `NUMERIC(39,0)` so nothing
//! is lost for tokens with very large supplies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Indexer State
// =============================================================================

/// Per-chain indexing checkpoint and chain-level pricing context.
///
/// Exactly one row exists per chain. `last_processed_height` never exceeds
/// `last_known_height`; only the pipeline checkpoint advances it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    /// Chain identifier (e.g. "cosmoshub-4").
    pub chain_id: String,
    /// Last height fully processed and committed.
    pub last_processed_height: u64,
    /// Latest height the chain node has reported.
    pub last_known_height: u64,
    /// Denom of the chain's base token (e.g. "uatom").
    pub base_token: String,
    /// USD price of one base token, used to stamp trade fills.
    pub base_token_usd: f64,
    /// Last checkpoint time.
    pub date_updated: DateTime<Utc>,
}

// =============================================================================
// Transactions
// =============================================================================

/// An inscription-bearing chain transaction.
///
/// Every transaction whose memo carries a metaprotocol URN is persisted
/// exactly once, whether or not protocol processing succeeded.
/// `status_message == None` means the protocol operation was applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// Block height the transaction was included at.
    pub height: u64,
    /// Transaction hash (upper-case hex), unique.
    pub hash: String,
    /// Raw transaction body as JSON text.
    pub content: String,
    /// Gas consumed by execution.
    pub gas_used: u64,
    /// Fee string as paid, e.g. "1500uatom".
    pub fees: String,
    /// Byte length of `content`.
    pub content_length: u64,
    /// Why protocol processing failed, if it did.
    pub status_message: Option<String>,
    /// Block time of the containing block.
    pub date_created: DateTime<Utc>,
}

/// Insertable form of [`Transaction`] (id assigned by the store).
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub height: u64,
    pub hash: String,
    pub content: String,
    pub gas_used: u64,
    pub fees: String,
    pub content_length: u64,
    pub date_created: DateTime<Utc>,
}

// =============================================================================
// Inscriptions
// =============================================================================

/// A content inscription anchored to the chain.
///
/// Identified by its content: `content_hash` is unique, so inscribing
/// byte-identical content twice fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inscription {
    pub id: i64,
    pub chain_id: String,
    pub height: u64,
    /// Metaprotocol version string from the URN.
    pub version: String,
    /// Creating transaction, unique.
    pub transaction_id: i64,
    /// SHA-256 of the content, lower-case hex, unique.
    pub content_hash: String,
    pub creator: String,
    pub current_owner: String,
    /// Advertised MIME type.
    pub content_type: String,
    /// Free-form metadata from the inscribe URN parameters.
    pub metadata: serde_json::Value,
    /// Path of the content in the payload store.
    pub content_path: String,
    pub content_size_bytes: u64,
    pub is_explicit: bool,
    pub date_created: DateTime<Utc>,
}

/// Actions recorded in inscription history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InscriptionAction {
    Inscribe,
    Transfer,
    List,
    Delist,
    Buy,
}

impl InscriptionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InscriptionAction::Inscribe => "inscribe",
            InscriptionAction::Transfer => "transfer",
            InscriptionAction::List => "list",
            InscriptionAction::Delist => "delist",
            InscriptionAction::Buy => "buy",
        }
    }
}

/// Append-only inscription event, one row per state-affecting operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InscriptionHistory {
    pub id: i64,
    pub chain_id: String,
    pub inscription_id: i64,
    /// Producing transaction, unique per history table.
    pub transaction_id: i64,
    pub sender: String,
    pub receiver: Option<String>,
    pub action: InscriptionAction,
    pub height: u64,
    pub date_created: DateTime<Utc>,
}

// =============================================================================
// CFT-20 Tokens
// =============================================================================

/// A CFT-20 fungible token.
///
/// Invariants: `circulating_supply <= max_supply` and
/// `per_mint_limit <= max_supply` at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: i64,
    pub chain_id: String,
    pub height: u64,
    pub version: String,
    /// Deploying transaction, unique.
    pub transaction_id: i64,
    /// Upper-case ticker, unique per chain.
    pub ticker: String,
    pub name: String,
    pub decimals: u32,
    pub max_supply: u128,
    pub per_mint_limit: u128,
    /// Height at which minting opens.
    pub launch_height: u64,
    pub circulating_supply: u128,
    /// Base-token unit price of the last marketplace fill.
    pub last_price_base: u128,
    /// Rolling 24h traded volume in base tokens.
    pub volume_24_base: u128,
    pub creator: String,
    pub current_owner: String,
    pub mint_page: String,
    pub metadata: Option<serde_json::Value>,
    /// Payload-store path of the token logo, if one was attached on deploy.
    pub content_path: Option<String>,
    pub is_explicit: bool,
    pub date_created: DateTime<Utc>,
}

/// Balance of one address in one token.
///
/// A row with `amount == 0` may exist or be deleted; queries filter `> 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHolder {
    pub id: i64,
    pub chain_id: String,
    pub token_id: i64,
    pub address: String,
    pub amount: u128,
    pub date_updated: DateTime<Utc>,
}

/// Actions recorded in token address history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenAction {
    Mint,
    Transfer,
    List,
    Delist,
    Bridge,
}

impl TokenAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenAction::Mint => "mint",
            TokenAction::Transfer => "transfer",
            TokenAction::List => "list",
            TokenAction::Delist => "delist",
            TokenAction::Bridge => "bridge",
        }
    }
}

/// Append-only token movement event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAddressHistory {
    pub id: i64,
    pub chain_id: String,
    pub token_id: i64,
    pub transaction_id: i64,
    pub sender: String,
    pub receiver: Option<String>,
    pub action: TokenAction,
    pub amount: u128,
    pub height: u64,
    pub date_created: DateTime<Utc>,
}

// =============================================================================
// Marketplace
// =============================================================================

/// A marketplace listing for either an inscription or a CFT-20 lot.
///
/// The three flags encode the lifecycle; exactly one of the four tuples
/// OPEN `(F,F,F)`, RESERVED `(T,F,F)`, FILLED `(F,T,F)`, CANCELLED `(F,F,T)`
/// is ever reachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceListing {
    pub id: i64,
    pub chain_id: String,
    pub seller_address: String,
    /// Asking price in base tokens.
    pub total: u128,
    /// Deposit the buyer is expected to escrow on-chain.
    pub deposit_total: u128,
    /// Reservation window in blocks, counted from the deposit height.
    pub deposit_timeout: u64,
    pub depositor_address: Option<String>,
    /// Height after which a deposit lapses.
    pub depositor_timedout_block: Option<u64>,
    pub is_deposited: bool,
    pub is_filled: bool,
    pub is_cancelled: bool,
    /// Creating (list) transaction.
    pub transaction_id: i64,
    pub date_created: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
}

impl MarketplaceListing {
    /// Listing accepts a deposit: not reserved, not filled, not cancelled.
    pub fn is_open(&self) -> bool {
        !self.is_deposited && !self.is_filled && !self.is_cancelled
    }

    /// Listing still escrows its asset: neither filled nor cancelled.
    pub fn is_live(&self) -> bool {
        !self.is_filled && !self.is_cancelled
    }
}

/// Sidecar attaching a listing to an inscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceInscriptionDetail {
    pub id: i64,
    pub listing_id: i64,
    pub inscription_id: i64,
}

/// Sidecar attaching a listing to a CFT-20 lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceCft20Detail {
    pub id: i64,
    pub listing_id: i64,
    pub token_id: i64,
    /// Escrowed amount in token base units.
    pub amount: u128,
    /// Base-token price per whole token unit.
    pub ppt: u128,
}

/// Actions recorded in listing history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingAction {
    List,
    Deposit,
    Buy,
    Delist,
    Timeout,
}

impl ListingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingAction::List => "list",
            ListingAction::Deposit => "deposit",
            ListingAction::Buy => "buy",
            ListingAction::Delist => "delist",
            ListingAction::Timeout => "timeout",
        }
    }
}

/// Append-only listing-level event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceListingHistory {
    pub id: i64,
    pub listing_id: i64,
    pub sender_address: String,
    pub action: ListingAction,
    pub transaction_id: i64,
    pub height: u64,
    pub date_created: DateTime<Utc>,
}

/// Append-only marketplace fill.
///
/// `amount_base` is the settled base-token total, `amount_quote` the asset
/// quantity, `rate` the unit price and `total_usd` the base total priced at
/// the fill-height USD rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    pub id: i64,
    pub chain_id: String,
    pub transaction_id: i64,
    pub seller_address: String,
    pub buyer_address: String,
    pub amount_base: u128,
    pub amount_quote: u128,
    pub rate: u128,
    pub total_usd: f64,
    pub height: u64,
    pub date_created: DateTime<Utc>,
}

// =============================================================================
// Bridge
// =============================================================================

/// A remote chain tokens can be bridged to, unique per
/// `(chain_id, remote_chain_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRemoteChain {
    pub id: i64,
    pub chain_id: String,
    pub remote_chain_id: String,
    pub remote_contract: String,
    pub ibc_channel: String,
}

/// Per-token bridge enablement gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeToken {
    pub id: i64,
    pub remote_chain_id: i64,
    pub token_id: i64,
    pub enabled: bool,
}

/// Append-only record of a signed bridge send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeHistory {
    pub id: i64,
    pub chain_id: String,
    pub token_id: i64,
    pub transaction_id: i64,
    pub sender: String,
    pub receiver: String,
    pub amount: u128,
    pub remote_chain_id: String,
    pub remote_contract: String,
    /// Base64 Ed25519 attestation signature, produced last.
    pub signature: String,
    pub height: u64,
    pub date_created: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(deposited: bool, filled: bool, cancelled: bool) -> MarketplaceListing {
        MarketplaceListing {
            id: 1,
            chain_id: "testchain-1".into(),
            seller_address: "cosmos1seller".into(),
            total: 200,
            deposit_total: 0,
            deposit_timeout: 50,
            depositor_address: None,
            depositor_timedout_block: None,
            is_deposited: deposited,
            is_filled: filled,
            is_cancelled: cancelled,
            transaction_id: 1,
            date_created: Utc::now(),
            date_updated: None,
        }
    }

    #[test]
    fn listing_state_predicates() {
        // OPEN
        assert!(listing(false, false, false).is_open());
        assert!(listing(false, false, false).is_live());
        // RESERVED: live but not open
        assert!(!listing(true, false, false).is_open());
        assert!(listing(true, false, false).is_live());
        // FILLED and CANCELLED are terminal
        assert!(!listing(false, true, false).is_live());
        assert!(!listing(false, false, true).is_live());
    }

    #[test]
    fn action_strings_are_stable() {
        // Ces chaînes sont écrites telles quelles dans les tables d'historique
        assert_eq!(InscriptionAction::Inscribe.as_str(), "inscribe");
        assert_eq!(TokenAction::Bridge.as_str(), "bridge");
        assert_eq!(ListingAction::Timeout.as_str(), "timeout");
    }
}
