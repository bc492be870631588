//! In-memory storage driver
//!
//! A single read/write lock around a map. Good for tests and as the default
//! when no backend is configured; everything is lost on restart.

use super::{
    collect_body, ByteStream, GetRequest, GetResponse, PutRequest, PutResponse, StorageDriver,
};
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryDriver {
    /// Storage key to blob bytes
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put_payload(&self, request: PutRequest<'_>) -> Result<PutResponse, StorageError> {
        // Drain before taking the lock so a slow uploader never blocks readers.
        let data = collect_body(request.data, request.content_length).await?;

        self.blobs.write().await.insert(request.key.to_string(), data);

        Ok(PutResponse {
            key: request.key.to_string(),
        })
    }

    async fn get_payload(&self, request: GetRequest<'_>) -> Result<GetResponse, StorageError> {
        let data = self
            .blobs
            .read()
            .await
            .get(request.key)
            .cloned()
            .ok_or(StorageError::BlobNotFound(None))?;

        let content_length = Some(data.len() as u64);
        let data: ByteStream = Box::pin(stream::once(async move { Ok::<_, std::io::Error>(data) }));

        Ok(GetResponse {
            content_length,
            data,
        })
    }

    async fn exist_payload(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn delete_payload(&self, key: &str) -> Result<(), StorageError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{chunked_body, exercise_driver};

    #[tokio::test]
    async fn test_driver_lifecycle() {
        let driver = MemoryDriver::new();
        exercise_driver(&driver).await;
        assert!(driver.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_blob_has_no_cause() {
        let driver = MemoryDriver::new();
        let err = match driver.get_payload(GetRequest { key: "nope" }).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.to_string(), "blob not found: <nil>");
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let driver = MemoryDriver::new();
        for (key, data) in [("a", b"first".as_slice()), ("b", b"second".as_slice())] {
            let mut body = chunked_body(data, 2);
            driver
                .put_payload(PutRequest {
                    key,
                    digest: "sha256:00",
                    content_length: data.len() as u64,
                    data: &mut body,
                })
                .await
                .unwrap();
        }

        assert_eq!(driver.keys().await, vec!["a".to_string(), "b".to_string()]);
        driver.delete_payload("a").await.unwrap();
        assert_eq!(driver.keys().await, vec!["b".to_string()]);
    }
}
