//! Protocol bundle trait definition.

use std::sync::Arc;

use meteorite_core::ports::MetaprotocolHandler;

/// A self-contained bundle for one metaprotocol.
///
/// Bundles provide a plugin-like architecture where each bundle can:
/// - Define its own database schema via migrations
/// - Register its metaprotocol processor
/// - Be independently developed and tested
///
/// # Example
///
/// ```ignore
/// pub struct MyProtocolBundle { /* ... */ }
///
/// impl ProtocolBundle for MyProtocolBundle {
///     fn name(&self) -> &'static str { "my_protocol" }
///
///     fn handlers(&self) -> Vec<Arc<dyn MetaprotocolHandler>> {
///         vec![Arc::new(MyProtocolHandler::new())]
///     }
///
///     fn migrations(&self) -> &'static [&'static str] {
///         MIGRATIONS
///     }
/// }
/// ```
pub trait ProtocolBundle: Send + Sync {
    /// Unique name identifying this bundle.
    ///
    /// Used for logging and migration tracking.
    fn name(&self) -> &'static str;

    /// Returns the metaprotocol processors provided by this bundle.
    ///
    /// These are registered with the indexer's HandlerRegistry under the
    /// protocol names they answer to.
    fn handlers(&self) -> Vec<Arc<dyn MetaprotocolHandler>>;

    /// SQL migration statements for this bundle's schema.
    ///
    /// Migrations are executed in order and tracked by checksum, so each
    /// string must never change once deployed.
    fn migrations(&self) -> &'static [&'static str] {
        &[]
    }

    /// Priority for bundle initialization (higher = earlier).
    ///
    /// Bundles whose tables reference another bundle's tables should use a
    /// lower priority so the referenced schema exists first.
    fn priority(&self) -> i32 {
        0
    }

    /// Tables owned by this bundle that should be truncated during purge.
    fn tables_to_purge(&self) -> &'static [&'static str] {
        &[]
    }
}
