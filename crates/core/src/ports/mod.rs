//! Port traits (interfaces) for infrastructure adapters.

mod chain_source;
mod handler;
mod payload_store;
mod repository;

pub use chain_source::{ChainSource, RawBlock, RawTransaction};
pub use handler::{HandlerRegistry, MetaprotocolHandler, TxContext};
pub use payload_store::PayloadStore;
pub use repository::{DbTransaction, Repositories};
