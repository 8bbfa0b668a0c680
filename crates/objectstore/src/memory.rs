//! In-memory payload store for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use meteorite_core::error::{StorageError, StorageResult};
use meteorite_core::ports::PayloadStore;

use crate::mime_extension;

/// Payload store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryPayloadStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects (distinct contents).
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl PayloadStore for MemoryPayloadStore {
    async fn put(&self, data: &[u8], mime: &str) -> StorageResult<String> {
        let digest = Sha256::digest(data);
        let key = format!("inscriptions/{}{}", hex::encode(digest), mime_extension(mime));
        self.objects
            .write()
            .await
            .entry(key.clone())
            .or_insert_with(|| data.to_vec());
        Ok(key)
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("payload {}", path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = MemoryPayloadStore::new();

        let a = store.put(b"payload", "text/plain").await.unwrap();
        let b = store.put(b"payload", "text/plain").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&a).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn get_unknown_path_is_not_found() {
        let store = MemoryPayloadStore::new();
        assert!(matches!(
            store.get("inscriptions/missing").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
