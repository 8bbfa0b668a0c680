//! Error types for the indexer domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ProtocolError`] - Metaprotocol rule violations and parse failures
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Blockchain LCD/RPC errors
//! - [`IndexerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Protocol errors are *expected* during normal indexing: they are recorded
//! on the offending transaction row (`status_message`) and the pipeline moves
//! on. Storage and chain errors interrupt the current height instead.

use thiserror::Error;

// =============================================================================
// Protocol Errors
// =============================================================================

/// Metaprotocol rule violations.
///
/// The `Display` output of these variants is what ends up in
/// `transactions.status_message`, so messages are written for operators
/// reading the database, not for developers reading a backtrace.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The memo does not parse as an inscription URN.
    #[error("malformed inscription urn: {0}")]
    MalformedUrn(String),

    /// The URN names a chain other than the one being indexed.
    #[error("chain ID in protocol string does not match the indexer chain ID")]
    ChainMismatch,

    /// No processor is registered for the named metaprotocol.
    #[error("unknown metaprotocol '{0}'")]
    UnknownProtocol(String),

    /// The metaprotocol exists but does not implement this operation.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// A required URN parameter is absent.
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    /// A URN parameter is present but unusable.
    #[error("invalid value for parameter '{key}': {reason}")]
    InvalidParameter {
        /// Parameter key as it appears in the URN.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The transaction envelope carries no content blob.
    #[error("inscription has no attached content")]
    ContentMissing,

    /// The attached content does not hash to the declared digest.
    #[error("inscription content does not match the declared hash")]
    ContentMismatch,

    /// An inscription with the same content hash already exists.
    #[error("inscription with this content already exists")]
    DuplicateContent,

    /// A token with the same ticker already exists.
    #[error("token with ticker '{0}' already exists")]
    DuplicateTicker(String),

    /// No token with this ticker.
    #[error("token with ticker '{0}' doesn't exist")]
    TokenNotFound(String),

    /// No inscription with this content hash.
    #[error("inscription '{0}' doesn't exist")]
    InscriptionNotFound(String),

    /// No listing with this identifier.
    #[error("listing '{0}' doesn't exist")]
    ListingNotFound(String),

    /// The sender is not the owner of the entity being acted on.
    #[error("sender does not own this {0}")]
    NotOwner(&'static str),

    /// Minting before the token's launch height.
    #[error("token has not launched yet")]
    NotLaunched,

    /// The token's max supply has been fully minted.
    #[error("token has been fully minted")]
    SoldOut,

    /// The sender's balance does not cover the requested amount.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// The listing is filled or cancelled.
    #[error("listing is no longer open")]
    ListingClosed,

    /// The listing already has a live deposit.
    #[error("listing is reserved by another buyer")]
    ListingReserved,

    /// The inscription is reserved in a live listing.
    #[error("inscription is locked in a live listing")]
    ListingLive,

    /// Only the depositor may buy a reserved listing.
    #[error("only the depositor may buy this listing")]
    NotDepositor,

    /// The depositor's reservation window has elapsed.
    #[error("deposit on this listing has expired")]
    DepositTimedOut,

    /// The seller may not reserve their own listing.
    #[error("seller may not deposit on their own listing")]
    SelfDeposit,

    /// No such remote chain configured for bridging.
    #[error("remote chain '{0}' doesn't exist")]
    RemoteChainNotFound(String),

    /// The remote contract in the URN does not match configuration.
    #[error("incorrect remote contract for chain '{0}'")]
    RemoteContractMismatch(String),

    /// The token is not enabled for bridging to the remote chain.
    #[error("token not enabled for bridging to '{0}'")]
    BridgeNotEnabled(String),

    /// Zero or negative amounts are never valid.
    #[error("amount must be greater than 0")]
    InvalidAmount,

    /// The sender address could not be read from the transaction.
    #[error("unable to resolve sender address: {0}")]
    SenderUnresolved(String),

    /// Storage failure during protocol processing.
    ///
    /// Unlike every other variant this is *not* recorded as a
    /// `status_message`: it aborts the height so the pipeline retries.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ProtocolError {
    /// Whether this error is an expected protocol outcome (recorded on the
    /// transaction row) as opposed to an infrastructure failure (retried).
    pub fn is_expected(&self) -> bool {
        !matches!(self, ProtocolError::Storage(_))
    }

    /// Collapse into a storage error for contexts that only speak storage.
    pub fn into_storage(self) -> StorageError {
        match self {
            ProtocolError::Storage(e) => e,
            other => StorageError::QueryError(other.to_string()),
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database constraint was violated (unique, foreign key, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Object store operation failed.
    #[error("Object store error: {0}")]
    ObjectStoreError(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Blockchain LCD and connectivity errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// HTTP connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The node answered with an error or undecodable body.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// The requested height is not (yet) available on the node.
    #[error("Block not available at height {0}")]
    BlockNotAvailable(u64),

    /// A transaction field required by the indexer could not be read.
    #[error("Transaction decode error: {0}")]
    DecodeError(String),

    /// Operation timed out.
    #[error("Timeout talking to the chain node")]
    Timeout,
}

impl ChainError {
    /// Transient errors are retried with backoff; permanent ones halt the
    /// height so an operator can intervene.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::ConnectionFailed(_)
                | ChainError::Timeout
                | ChainError::BlockNotAvailable(_)
        )
    }
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level indexer orchestration errors.
///
/// This is the main error type returned by [`crate::services::IndexerService`].
/// It wraps all lower-level errors and adds pipeline-specific variants.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Metaprotocol error that escaped the per-transaction handling.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blockchain connectivity error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connected chain doesn't match the configured chain ID.
    ///
    /// This is a fatal error that requires manual intervention.
    #[error("Chain mismatch: connected to {connected} but configured for {expected}")]
    ChainMismatch {
        /// Chain ID reported by the node.
        connected: String,
        /// Chain ID the indexer was configured with.
        expected: String,
    },

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Indexer shutdown requested")]
    ShutdownRequested,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for metaprotocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: la chaîne de conversion d'erreurs fonctionne
    // Permet d'utiliser ? à travers les couches
    #[test]
    fn test_error_conversion_chain() {
        // Storage -> Protocol -> Indexer
        let storage_err = StorageError::QueryError("db failed".into());
        let protocol_err: ProtocolError = storage_err.into();
        let indexer_err: IndexerError = protocol_err.into();

        // Le message original est préservé
        assert!(indexer_err.to_string().contains("db failed"));

        // Chain -> Indexer
        let chain_err = ChainError::RpcError("rpc failed".into());
        let indexer_err: IndexerError = chain_err.into();
        assert!(indexer_err.to_string().contains("rpc failed"));
    }

    // Test critique: seules les erreurs d'infrastructure interrompent le bloc
    #[test]
    fn test_expected_vs_infrastructure() {
        assert!(ProtocolError::InsufficientBalance.is_expected());
        assert!(ProtocolError::DuplicateTicker("TEST".into()).is_expected());
        assert!(ProtocolError::ChainMismatch.is_expected());

        let infra = ProtocolError::Storage(StorageError::TransactionError("deadlock".into()));
        assert!(!infra.is_expected());
    }

    #[test]
    fn test_transient_chain_errors() {
        assert!(ChainError::Timeout.is_transient());
        assert!(ChainError::BlockNotAvailable(42).is_transient());
        assert!(!ChainError::DecodeError("bad json".into()).is_transient());
    }

    #[test]
    fn test_status_message_is_operator_readable() {
        // Ces messages finissent dans transactions.status_message
        let err = ProtocolError::TokenNotFound("MARS".into());
        assert_eq!(err.to_string(), "token with ticker 'MARS' doesn't exist");
    }
}
