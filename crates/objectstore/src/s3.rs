//! S3-compatible payload store backend.
//!
//! Object storage backend supporting MinIO, LocalStack and other
//! S3-compatible services. Uploads use a simplified HTTP client without AWS
//! Signature v4 signing; services that need full IAM authentication should
//! sit behind a signing proxy.
//!
//! Paths are content-addressed: `inscriptions/<sha256-hex><ext>`. Storing
//! identical bytes always lands on the same key, so `put` is idempotent and
//! concurrent writers are commutative.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use meteorite_core::error::{StorageError, StorageResult};
use meteorite_core::ports::PayloadStore;

use crate::mime_extension;

/// S3 backend configuration.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 endpoint URL (e.g. "http://127.0.0.1:9000" for MinIO).
    pub endpoint: String,
    /// Region, kept for services that validate it.
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Key prefix for all objects.
    pub key_prefix: String,
    /// Access key ID.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
    /// Session token, if the credentials are temporary.
    pub session_token: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            region: "us-east-1".to_string(),
            bucket: "inscriptions".to_string(),
            key_prefix: "inscriptions/".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        }
    }
}

/// S3-compatible implementation of the payload store port.
pub struct S3PayloadStore {
    config: S3Config,
    http: reqwest::Client,
}

impl S3PayloadStore {
    pub fn new(config: S3Config) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StorageError::ObjectStoreError(e.to_string()))?;

        Ok(Self { config, http })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket,
            path
        )
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request;
        if let (Some(id), Some(secret)) = (
            self.config.access_key_id.as_deref(),
            self.config.secret_access_key.as_deref(),
        ) {
            request = request.basic_auth(id, Some(secret));
        }
        if let Some(token) = self.config.session_token.as_deref() {
            request = request.header("x-amz-security-token", token);
        }
        request
    }

    /// Content-addressed key for a blob.
    fn key_for(&self, data: &[u8], mime: &str) -> String {
        let digest = Sha256::digest(data);
        format!(
            "{}{}{}",
            self.config.key_prefix,
            hex::encode(digest),
            mime_extension(mime)
        )
    }
}

#[async_trait]
impl PayloadStore for S3PayloadStore {
    async fn put(&self, data: &[u8], mime: &str) -> StorageResult<String> {
        let key = self.key_for(data, mime);
        let url = self.object_url(&key);

        // The key is the content hash, so an existing object already holds
        // these exact bytes and the upload can be skipped.
        let head = self
            .apply_auth(self.http.head(&url))
            .send()
            .await
            .map_err(|e| StorageError::ObjectStoreError(e.to_string()))?;
        if head.status().is_success() {
            trace!(key = %key, "Payload already stored");
            return Ok(key);
        }

        let response = self
            .apply_auth(self.http.put(&url))
            .header("content-type", mime)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::ObjectStoreError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::ObjectStoreError(format!(
                "PUT {} returned {}",
                key,
                response.status()
            )));
        }

        debug!(key = %key, bytes = data.len(), "Payload stored");
        Ok(key)
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let url = self.object_url(path);
        let response = self
            .apply_auth(self.http.get(&url))
            .send()
            .await
            .map_err(|e| StorageError::ObjectStoreError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::NotFound(format!("payload {}", path)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::ObjectStoreError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_content_addressed() {
        let store = S3PayloadStore::new(S3Config::default()).unwrap();

        let a = store.key_for(b"same bytes", "image/png");
        let b = store.key_for(b"same bytes", "image/png");
        let c = store.key_for(b"other bytes", "image/png");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("inscriptions/"));
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn key_embeds_the_sha256() {
        let store = S3PayloadStore::new(S3Config::default()).unwrap();
        let key = store.key_for(b"hello", "text/plain");
        // SHA-256("hello")
        assert!(key.contains("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"));
    }
}
