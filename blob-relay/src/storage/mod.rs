//! Storage drivers
//!
//! The relay core only needs four operations from a backend: put, get,
//! exist and delete by opaque key. Anything else (regions, buckets,
//! credentials, retention) belongs to the driver.
//!
//! | Driver | Backing | Notes |
//! |--------|---------|-------|
//! | [`MemoryDriver`] | `HashMap` behind a read/write lock | default, tests |
//! | [`FileDriver`] | one file per key under a root directory | single node |
//! | `ObjectStoreDriver` | S3 / GCS / Azure via `object_store` | feature `object-store` |
//!
//! Bytes move as [`ByteStream`]s in both directions so that no layer above
//! the driver holds a whole blob in memory.

use crate::config::{DriverKind, RelayConfig};
use crate::error::StorageError;
use crate::logging::Logger;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::Stream;
use std::borrow::Cow;
use std::io;
use std::sync::Arc;

pub mod file;
pub mod memory;
#[cfg(feature = "object-store")]
pub mod object;

pub use file::FileDriver;
pub use memory::MemoryDriver;
#[cfg(feature = "object-store")]
pub use object::{ObjectStoreDriver, ObjectStoreKind};

/// Owned stream of blob bytes
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Borrowed stream of incoming blob bytes.
///
/// Borrowed rather than owned so the caller can inspect whatever wraps the
/// stream (the request hashing tee) once the driver has drained it.
pub type BodyStream<'a> = &'a mut (dyn Stream<Item = io::Result<Bytes>> + Send + Unpin);

pub struct PutRequest<'a> {
    /// Storage key the blob is written under
    pub key: &'a str,
    /// Digest the caller declared for the data, `sha256:<hex>`
    pub digest: &'a str,
    /// Declared size of the data
    pub content_length: u64,
    pub data: BodyStream<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    /// Key used to retrieve the stored data via a [`GetRequest`]
    pub key: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GetRequest<'a> {
    pub key: &'a str,
}

pub struct GetResponse {
    /// Size of the blob when the backend knows it up front
    pub content_length: Option<u64>,
    pub data: ByteStream,
}

/// A blob storage backend.
///
/// Implementations synchronize internally; the relay calls them from many
/// request tasks at once.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Store `request.data` under `request.key`, replacing any existing blob.
    async fn put_payload(&self, request: PutRequest<'_>) -> Result<PutResponse, StorageError>;

    /// Open a blob for streaming. Fails with [`StorageError::BlobNotFound`]
    /// before yielding any byte when the key is absent.
    async fn get_payload(&self, request: GetRequest<'_>) -> Result<GetResponse, StorageError>;

    async fn exist_payload(&self, key: &str) -> Result<bool, StorageError>;

    /// Remove a blob. Deleting an absent key succeeds.
    async fn delete_payload(&self, key: &str) -> Result<(), StorageError>;

    /// Health validation capability, for backends that have one
    fn validatable(&self) -> Option<&dyn Validatable> {
        None
    }
}

/// Backend health validation (bucket reachable, directory writable, ...)
#[async_trait]
pub trait Validatable: Send + Sync {
    async fn validate(&self) -> Result<(), StorageError>;
}

/// Build the driver selected by `config`
pub async fn build_driver(
    config: &RelayConfig,
    logger: Arc<dyn Logger>,
) -> Result<Arc<dyn StorageDriver>, StorageError> {
    logger.info(&format!("creating {} driver", config.driver));

    match config.driver {
        DriverKind::Memory => Ok(Arc::new(MemoryDriver::new())),
        DriverKind::File => Ok(Arc::new(FileDriver::new(&config.storage_dir, logger).await?)),
        DriverKind::S3 | DriverKind::Gcs | DriverKind::Azure => object_driver(config, logger),
    }
}

#[cfg(feature = "object-store")]
fn object_driver(
    config: &RelayConfig,
    logger: Arc<dyn Logger>,
) -> Result<Arc<dyn StorageDriver>, StorageError> {
    let bucket = config
        .bucket
        .as_deref()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| StorageError::Config("BUCKET environment variable not set".to_string()))?;

    let kind = match config.driver {
        DriverKind::S3 => {
            if config.region.as_deref().map_or(true, str::is_empty) {
                return Err(StorageError::Config(
                    "AWS_REGION environment variable not set".to_string(),
                ));
            }
            ObjectStoreKind::S3
        }
        DriverKind::Gcs => ObjectStoreKind::Gcs,
        DriverKind::Azure => {
            if std::env::var_os("AZURE_STORAGE_ACCOUNT_NAME").is_none() {
                return Err(StorageError::Config(
                    "AZURE_STORAGE_ACCOUNT_NAME environment variable not set".to_string(),
                ));
            }
            ObjectStoreKind::Azure
        }
        other => {
            return Err(StorageError::Config(format!(
                "'{}' is not an object store driver",
                other
            )))
        }
    };

    let driver = ObjectStoreDriver::from_env(
        kind,
        bucket,
        config.region.as_deref(),
        config.prefix.clone(),
        logger,
    )?;
    Ok(Arc::new(driver))
}

#[cfg(not(feature = "object-store"))]
fn object_driver(
    config: &RelayConfig,
    _logger: Arc<dyn Logger>,
) -> Result<Arc<dyn StorageDriver>, StorageError> {
    Err(StorageError::Config(format!(
        "driver '{}' requires building with the object-store feature",
        config.driver
    )))
}

/// Split a key into path components a filesystem or bucket accepts.
///
/// Leading slashes are ignored. An empty component (from `a//b` or a
/// trailing `/`) becomes `%`, and a literal `%` is written as `%25`, so two
/// distinct keys never share a path. `.`, `..`, backslashes and NUL are
/// rejected.
pub(crate) fn key_components(key: &str) -> Result<Vec<Cow<'_, str>>, StorageError> {
    let trimmed = key.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    trimmed
        .split('/')
        .map(|component| match component {
            "" => Ok(Cow::Borrowed("%")),
            "." | ".." => Err(StorageError::InvalidKey(key.to_string())),
            c if c.contains('\\') || c.contains('\0') => {
                Err(StorageError::InvalidKey(key.to_string()))
            }
            c if c.contains('%') => Ok(Cow::Owned(c.replace('%', "%25"))),
            c => Ok(Cow::Borrowed(c)),
        })
        .collect()
}

/// Drain a stream into memory. Drivers whose backend needs the whole blob at
/// once use this; the relay itself never does.
pub(crate) async fn collect_body(
    data: BodyStream<'_>,
    size_hint: u64,
) -> Result<Bytes, StorageError> {
    use futures_util::TryStreamExt;

    let mut buffer = Vec::with_capacity(size_hint.min(64 * 1024 * 1024) as usize);
    while let Some(chunk) = data.try_next().await? {
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}


#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures_util::{stream, TryStreamExt};

    /// A body stream yielding `data` in chunks of `chunk_size`
    pub fn chunked_body(data: &[u8], chunk_size: usize) -> ByteStream {
        let chunks: Vec<io::Result<Bytes>> = data
            .chunks(chunk_size.max(1))
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    pub async fn read_all(response: GetResponse) -> Vec<u8> {
        let chunks: Vec<Bytes> = response.data.try_collect().await.unwrap();
        chunks.concat()
    }

    /// Put / exist / get / delete lifecycle every driver must pass
    pub async fn exercise_driver(driver: &dyn StorageDriver) {
        let key = "/blobs/test/common/sha256:abcd/sha256:ef01";

        // Missing payload
        assert!(!driver.exist_payload(key).await.unwrap());
        match driver.get_payload(GetRequest { key }).await {
            Err(StorageError::BlobNotFound(_)) => {}
            Err(other) => panic!("expected BlobNotFound, got {other}"),
            Ok(_) => panic!("expected BlobNotFound, got data"),
        }

        // Put a payload
        let data = b"hello world";
        let mut body = chunked_body(data, 4);
        let put = driver
            .put_payload(PutRequest {
                key,
                digest: "sha256:abcd",
                content_length: data.len() as u64,
                data: &mut body,
            })
            .await
            .unwrap();
        assert_eq!(put.key, key);

        // Exists, and reads back byte for byte
        assert!(driver.exist_payload(key).await.unwrap());
        let response = driver.get_payload(GetRequest { key }).await.unwrap();
        if let Some(len) = response.content_length {
            assert_eq!(len, data.len() as u64);
        }
        assert_eq!(read_all(response).await, data);

        // Overwrite is allowed and idempotent for identical content
        let mut body = chunked_body(data, 64);
        driver
            .put_payload(PutRequest {
                key,
                digest: "sha256:abcd",
                content_length: data.len() as u64,
                data: &mut body,
            })
            .await
            .unwrap();
        let response = driver.get_payload(GetRequest { key }).await.unwrap();
        assert_eq!(read_all(response).await, data);

        // Delete, then deleting again still succeeds
        driver.delete_payload(key).await.unwrap();
        assert!(!driver.exist_payload(key).await.unwrap());
        driver.delete_payload(key).await.unwrap();
    }
}
