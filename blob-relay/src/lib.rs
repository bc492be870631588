//! Blob Relay - content-addressed storage for oversized workflow payloads
//!
//! Workflow histories cap the size of a single payload. A client-side codec
//! uploads anything over its threshold here and keeps only a small reference
//! in the history; on the way back it fetches the bytes by key and verifies
//! them.
//!
//! ## Architecture
//!
//! ```text
//! codec ──PUT /v2/blobs/put──▶ HttpServer ──▶ BlobHandlerV2 ──▶ StorageDriver
//!       ◀─GET /v2/blobs/get──             └─▶ BlobHandlerV1 ──┘  (memory, file,
//!                                                                 s3, gcs, azure)
//! ```
//!
//! ## Storage keys
//!
//! | Version | Key |
//! |---------|-----|
//! | v1 | `blobs/<digest>` |
//! | v2 | `/blobs/<ns>/common/<digest>/<metadata-hash>` |
//! | v2 + prefix | `/blobs/<ns>/custom/<prefix>/<digest>/<metadata-hash>` |
//!
//! ## Features
//!
//! - `object-store` - S3, GCS and Azure Blob drivers via `object_store`

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod keys;
pub mod locks;
pub mod logging;
pub mod storage;

// Re-exports
pub use config::{DriverKind, RelayConfig};
pub use error::{KeyError, RelayError, StorageError};
pub use handler::{BlobHandlerV1, BlobHandlerV2, HandlerOptions, RelayBody};
pub use http::HttpServer;
pub use keys::{compute_key, hash_metadata, legacy_key};
pub use logging::{Logger, NoopLogger, TracingLogger};
pub use storage::{build_driver, FileDriver, MemoryDriver, StorageDriver, Validatable};
