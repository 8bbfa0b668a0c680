//! Metaprotocol bundles for the Meteorite indexer.
//!
//! This crate provides a plugin-like system for extending the indexer with
//! metaprotocol processors. Each bundle is self-contained with its own:
//!
//! - Processor (URN operation handling)
//! - SQL migrations (table definitions)
//! - Storage functions (queries on the pipeline's transaction)
//!
//! # Bundles
//!
//! - [`inscription`] - content inscriptions (`inscribe`, `transfer`)
//! - [`cft20`] - fungible tokens (`deploy`, `mint`, `transfer`)
//! - [`marketplace`] - listings for both (`list.*`, `deposit`, `buy`,
//!   `delist`) plus the deposit-timeout sweeper
//! - [`bridge`] - signed cross-chain sends (`send`)
//!
//! # Registering Bundles
//!
//! ```ignore
//! let mut registry = BundleRegistry::new();
//! registry.register(Box::new(InscriptionBundle::new(store.clone())));
//! registry.register(Box::new(Cft20Bundle::new(store.clone())));
//! registry.register(Box::new(MarketplaceBundle::new(marketplace_config)));
//! registry.register(Box::new(BridgeBundle::new(signer)));
//!
//! // Run all bundle migrations (tracked, idempotent)
//! registry.run_migrations(db.pool()).await?;
//!
//! // Get the unified handler registry for the indexer
//! let handlers = registry.into_handler_registry();
//! ```

pub mod bridge;
pub mod cft20;
pub mod inscription;
pub mod marketplace;

mod bundle;
mod registry;
mod utils;

pub use bundle::ProtocolBundle;
pub use registry::BundleRegistry;

// Re-export the bundles for convenience
pub use bridge::BridgeBundle;
pub use cft20::Cft20Bundle;
pub use inscription::InscriptionBundle;
pub use marketplace::MarketplaceBundle;
