//! Port trait for metaprotocol processors.
//!
//! This is the main extensibility point of the indexer. Each metaprotocol
//! (inscription, cft20, marketplace, bridge) implements this trait; the
//! registry routes parsed URNs to the processor registered under the URN's
//! protocol name. Adding a protocol is a code change, not a plugin load.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgConnection;

use crate::error::{ProtocolResult, StorageResult};
use crate::models::Transaction;
use crate::ports::chain_source::RawTransaction;
use crate::urn::ParsedUrn;

/// Everything a processor needs to know about the transaction it is
/// processing. The database handle is passed separately because it is a
/// savepoint scoped to this one protocol call.
pub struct TxContext<'a> {
    /// Chain the indexer is configured for (already matched against the URN).
    pub chain_id: &'a str,
    /// The persisted `transactions` row.
    pub transaction: &'a Transaction,
    /// The parsed metaprotocol URN from the memo.
    pub urn: &'a ParsedUrn,
    /// The raw transaction, for envelope payload access.
    pub raw: &'a RawTransaction,
    /// Resolved bech32 sender address.
    pub sender: &'a str,
}

/// Trait for metaprotocol processors.
///
/// `process` runs inside a savepoint opened by the pipeline: on error all of
/// the processor's writes are rolled back, while the transaction row itself
/// stays committed with the error recorded in `status_message`.
#[async_trait]
pub trait MetaprotocolHandler: Send + Sync {
    /// Protocol name as it appears in the URN (e.g. "cft20").
    fn name(&self) -> &'static str;

    /// Apply one metaprotocol operation.
    async fn process(&self, conn: &mut PgConnection, ctx: &TxContext<'_>) -> ProtocolResult<()>;

    /// Called once after every height, inside the checkpoint transaction.
    ///
    /// This is where per-height maintenance lives, such as the marketplace
    /// deposit-timeout sweep.
    async fn on_height_end(&self, _conn: &mut PgConnection, _height: u64) -> StorageResult<()> {
        Ok(())
    }

    /// Priority for `on_height_end` execution (higher = earlier).
    fn priority(&self) -> i32 {
        0
    }
}

/// Registry mapping URN protocol names to processors.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MetaprotocolHandler>>,
    ordered_handlers: Vec<Arc<dyn MetaprotocolHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            ordered_handlers: Vec::new(),
        }
    }

    /// Register a processor under its protocol name.
    pub fn register(&mut self, handler: Arc<dyn MetaprotocolHandler>) {
        let name = handler.name().to_string();
        self.handlers.insert(name, handler.clone());
        self.ordered_handlers.push(handler);
        // Sort by priority (descending)
        self.ordered_handlers
            .sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    /// Get the processor for a protocol name.
    pub fn get(&self, protocol: &str) -> Option<&Arc<dyn MetaprotocolHandler>> {
        self.handlers.get(protocol)
    }

    /// All processors in priority order.
    pub fn all(&self) -> &[Arc<dyn MetaprotocolHandler>] {
        &self.ordered_handlers
    }

    /// Check if a protocol has a registered processor.
    pub fn has_handler(&self, protocol: &str) -> bool {
        self.handlers.contains_key(protocol)
    }

    /// List all registered protocol names.
    pub fn registered_protocols(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockHandler(&'static str, i32);

    #[async_trait]
    impl MetaprotocolHandler for MockHandler {
        fn name(&self) -> &'static str {
            self.0
        }
        fn priority(&self) -> i32 {
            self.1
        }
        async fn process(
            &self,
            _conn: &mut PgConnection,
            _ctx: &TxContext<'_>,
        ) -> ProtocolResult<()> {
            Ok(())
        }
    }

    #[test]
    fn lookup_is_by_protocol_name() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(MockHandler("cft20", 0)));
        registry.register(Arc::new(MockHandler("bridge", 0)));

        assert!(registry.has_handler("cft20"));
        assert!(registry.get("bridge").is_some());
        assert!(registry.get("nft").is_none());
    }

    // Test critique: les handlers sont triés par priorité (décroissante)
    #[test]
    fn test_handler_registry_priority_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(MockHandler("low", -10)));
        registry.register(Arc::new(MockHandler("high", 100)));
        registry.register(Arc::new(MockHandler("medium", 50)));

        let all = registry.all();
        assert_eq!(all[0].name(), "high");
        assert_eq!(all[1].name(), "medium");
        assert_eq!(all[2].name(), "low");
    }
}
