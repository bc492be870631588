//! Cloud object storage driver (S3, GCS, Azure Blob)
//!
//! Thin wrapper over an `object_store::ObjectStore`. Uploads go through the
//! store's multipart writer so a blob is streamed to the bucket chunk by chunk.

use super::{
    key_components, ByteStream, GetRequest, GetResponse, PutRequest, PutResponse, StorageDriver,
    Validatable,
};
use crate::error::StorageError;
use crate::logging::{Logger, NoopLogger};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Which cloud backend to build from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStoreKind {
    S3,
    Gcs,
    Azure,
}

pub struct ObjectStoreDriver {
    store: Arc<dyn ObjectStore>,
    kind_name: &'static str,
    /// Optional path prefix inside the bucket
    prefix: Option<String>,
    logger: Arc<dyn Logger>,
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StorageError::BlobNotFound(Some(err.to_string())),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl ObjectStoreDriver {
    /// Build a driver from the standard environment variables of the chosen
    /// cloud (`AWS_*`, `GOOGLE_*`, `AZURE_*`), targeting `bucket`.
    pub fn from_env(
        kind: ObjectStoreKind,
        bucket: &str,
        region: Option<&str>,
        prefix: Option<String>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::Config("bucket name is required".to_string()));
        }

        let (store, kind_name): (Arc<dyn ObjectStore>, &'static str) = match kind {
            ObjectStoreKind::S3 => {
                let mut builder =
                    object_store::aws::AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                (Arc::new(builder.build()?), "s3")
            }
            ObjectStoreKind::Gcs => {
                let store = object_store::gcp::GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()?;
                (Arc::new(store), "gcs")
            }
            ObjectStoreKind::Azure => {
                let store = object_store::azure::MicrosoftAzureBuilder::from_env()
                    .with_container_name(bucket)
                    .build()?;
                (Arc::new(store), "azure")
            }
        };

        logger.info(&format!("initialized {} driver for bucket {}", kind_name, bucket));

        Ok(Self {
            store,
            kind_name,
            prefix,
            logger,
        })
    }

    /// Wrap an already built store
    pub fn with_store(store: Arc<dyn ObjectStore>, prefix: Option<String>) -> Self {
        Self {
            store,
            kind_name: "object_store",
            prefix,
            logger: NoopLogger::shared(),
        }
    }

    fn object_path(&self, key: &str) -> Result<ObjectPath, StorageError> {
        let relative = key_components(key)?.join("/");
        let full = match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, relative),
            _ => relative,
        };
        ObjectPath::parse(&full).map_err(|_| StorageError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl StorageDriver for ObjectStoreDriver {
    fn name(&self) -> &'static str {
        self.kind_name
    }

    async fn put_payload(&self, mut request: PutRequest<'_>) -> Result<PutResponse, StorageError> {
        let path = self.object_path(request.key)?;
        let (multipart_id, mut writer) = self.store.put_multipart(&path).await?;

        let upload = async {
            while let Some(chunk) = request.data.try_next().await? {
                writer.write_all(&chunk).await?;
            }
            writer.shutdown().await
        };

        if let Err(e) = upload.await {
            if let Err(abort) = self.store.abort_multipart(&path, &multipart_id).await {
                self.logger
                    .error(&format!("failed to abort upload for {}: {}", request.key, abort));
            }
            return Err(e.into());
        }

        self.logger.debug(&format!(
            "stored blob key={} size={}",
            request.key, request.content_length
        ));

        Ok(PutResponse {
            key: request.key.to_string(),
        })
    }

    async fn get_payload(&self, request: GetRequest<'_>) -> Result<GetResponse, StorageError> {
        let path = self.object_path(request.key)?;
        let result = self.store.get(&path).await?;
        let content_length = Some(result.meta.size as u64);

        let data: ByteStream = result
            .into_stream()
            .map_err(io::Error::other)
            .boxed();

        Ok(GetResponse {
            content_length,
            data,
        })
    }

    async fn exist_payload(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_payload(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn validatable(&self) -> Option<&dyn Validatable> {
        Some(self)
    }
}

#[async_trait]
impl Validatable for ObjectStoreDriver {
    /// Listing the prefix proves credentials and bucket are usable
    async fn validate(&self) -> Result<(), StorageError> {
        let prefix = match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(p) if !p.is_empty() => Some(ObjectPath::from(p)),
            _ => None,
        };
        self.store
            .list_with_delimiter(prefix.as_ref())
            .await
            .map_err(|e| StorageError::Backend(format!("bucket is not reachable: {}", e)))?;
        Ok(())
    }
}
