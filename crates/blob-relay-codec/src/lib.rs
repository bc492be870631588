//! Remote payload codec for the blob relay
//!
//! Workflow payloads larger than a threshold are uploaded to a blob relay and
//! replaced in history by a small JSON reference:
//!
//! ```text
//! metadata: { encoding: json/plain, temporal.io/remote-codec: v2 }
//! data:     { "metadata": {...}, "size": 500000, "digest": "sha256:...", "key": "/blobs/..." }
//! ```
//!
//! Decoding fetches the bytes by key, checks size and digest while streaming,
//! and restores the original payload exactly. References written by v1 codecs
//! (addressed by digest) are still resolved.
//!
//! # Example
//!
//! ```rust,no_run
//! use blob_relay_codec::{CodecConfig, PayloadCodec, RemoteCodec};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let codec: Arc<dyn PayloadCodec> = Arc::new(
//!     RemoteCodec::connect(CodecConfig {
//!         min_bytes: 64_000,
//!         ..CodecConfig::new("http://localhost:8577", "default")
//!     })
//!     .await?,
//! );
//!
//! let stored = codec.encode(Vec::new()).await?;
//! let restored = codec.decode(stored).await?;
//! assert!(restored.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod types;

// Re-export main types
pub use client::{PayloadCodec, RemoteCodec};
pub use config::{CodecConfig, DEFAULT_MIN_BYTES};
pub use error::{CodecError, Result};
pub use types::{Payload, RemotePayload};

pub use blob_relay_protocol::{Metadata, ProtocolVersion};
