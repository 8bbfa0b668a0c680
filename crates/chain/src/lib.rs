//! Cosmos LCD chain source adapter for the Meteorite indexer.

mod client;

pub use client::{LcdClient, LcdClientConfig};
