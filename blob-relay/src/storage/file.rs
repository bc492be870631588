//! Filesystem storage driver
//!
//! Stores one file per key under a root directory. The key's `/`-separated
//! components become directories, so
//! `/blobs/ns/common/sha256:ab../sha256:cd..` lands at
//! `<root>/blobs/ns/common/sha256:ab../sha256:cd..`.
//!
//! Writes stream into a temp file beside the target and are renamed into
//! place, so a reader never sees a partially written blob.

use super::{
    key_components, ByteStream, GetRequest, GetResponse, PutRequest, PutResponse, StorageDriver,
    Validatable,
};
use crate::error::StorageError;
use crate::logging::{Logger, NoopLogger};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, TryStreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read size when streaming a blob back out (64KB)
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

pub struct FileDriver {
    /// Root directory for blob storage
    root_dir: PathBuf,
    logger: Arc<dyn Logger>,
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub total_blobs: u64,
    pub total_bytes: u64,
}

impl FileDriver {
    /// Create a driver rooted at `root_dir`, creating the directory
    pub async fn new<P: AsRef<Path>>(root_dir: P, logger: Arc<dyn Logger>) -> Result<Self, StorageError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await?;

        logger.info(&format!("initialized file driver at {}", root_dir.display()));

        Ok(Self { root_dir, logger })
    }

    /// Driver without logging, for embedding and tests
    pub async fn open<P: AsRef<Path>>(root_dir: P) -> Result<Self, StorageError> {
        Self::new(root_dir, NoopLogger::shared()).await
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Map a storage key onto a path under the root
    fn blob_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.root_dir.clone();
        for component in key_components(key)? {
            path.push(component.as_ref());
        }
        Ok(path)
    }

    /// Count blobs and bytes under the root
    pub async fn stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();
        let mut pending = vec![self.root_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if !is_temp_file(&entry.path()) {
                    stats.total_blobs += 1;
                    stats.total_bytes += entry.metadata().await?.len();
                }
            }
        }

        Ok(stats)
    }

    async fn write_temp(&self, temp_path: &Path, request: &mut PutRequest<'_>) -> Result<u64, StorageError> {
        let mut file = fs::File::create(temp_path).await?;
        let mut written = 0u64;
        while let Some(chunk) = request.data.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.') && name.ends_with(".tmp"))
        .unwrap_or(false)
}

#[async_trait]
impl StorageDriver for FileDriver {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn put_payload(&self, mut request: PutRequest<'_>) -> Result<PutResponse, StorageError> {
        let blob_path = self.blob_path(request.key)?;
        let parent = blob_path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(request.key.to_string()))?;
        fs::create_dir_all(parent).await?;

        let temp_path = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let written = match self.write_temp(&temp_path, &mut request).await {
            Ok(written) => written,
            Err(e) => {
                fs::remove_file(&temp_path).await.ok();
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(e.into());
        }

        self.logger.debug(&format!(
            "stored blob key={} size={}",
            request.key, written
        ));

        Ok(PutResponse {
            key: request.key.to_string(),
        })
    }

    async fn get_payload(&self, request: GetRequest<'_>) -> Result<GetResponse, StorageError> {
        let blob_path = self.blob_path(request.key)?;

        let file = match fs::File::open(&blob_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::BlobNotFound(None))
            }
            Err(e) => return Err(e.into()),
        };
        let content_length = file.metadata().await?.len();

        let data: ByteStream = Box::pin(stream::try_unfold(file, |mut file| async move {
            let mut buffer = vec![0u8; READ_CHUNK_SIZE];
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                return Ok(None);
            }
            buffer.truncate(read);
            Ok(Some((Bytes::from(buffer), file)))
        }));

        Ok(GetResponse {
            content_length: Some(content_length),
            data,
        })
    }

    async fn exist_payload(&self, key: &str) -> Result<bool, StorageError> {
        let blob_path = self.blob_path(key)?;
        match fs::metadata(&blob_path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_payload(&self, key: &str) -> Result<(), StorageError> {
        let blob_path = self.blob_path(key)?;
        match fs::remove_file(&blob_path).await {
            Ok(()) => {
                self.logger.debug(&format!("deleted blob key={}", key));
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn validatable(&self) -> Option<&dyn Validatable> {
        Some(self)
    }
}

#[async_trait]
impl Validatable for FileDriver {
    async fn validate(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root_dir).await?;

        let probe = self.root_dir.join(format!(".probe-{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&probe, b"ok").await.map_err(|e| {
            StorageError::Config(format!(
                "storage directory {} is not writable: {}",
                self.root_dir.display(),
                e
            ))
        })?;
        fs::remove_file(&probe).await?;
        Ok(())
    }
}
