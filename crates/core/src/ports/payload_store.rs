//! Port trait for the content-addressed payload store.
//!
//! Inscription content lives outside the relational store. The store is
//! append-only and content-addressed: `put` of identical bytes is a no-op
//! that returns the same path, so writes are commutative and idempotent.

use async_trait::async_trait;

use crate::error::StorageResult;

/// Content-addressed blob store for inscription payloads.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Store `data`, returning a stable path derived from its content hash.
    ///
    /// The advertised MIME type only influences the path's file extension.
    async fn put(&self, data: &[u8], mime: &str) -> StorageResult<String>;

    /// Fetch previously stored content. Only the read-side API uses this.
    async fn get(&self, path: &str) -> StorageResult<Vec<u8>>;
}
