//! Blob Relay Protocol
//!
//! Wire-level types shared by the relay server (`blob-relay`) and the
//! client-side payload codec (`blob-relay-codec`).
//!
//! ## Core Concepts
//!
//! 1. **Digest** - `"<algorithm>:<hex>"` identifier of blob content (sha256 only)
//! 2. **Metadata** - the workflow payload's `map<string, bytes>`, carried on PUT
//!    as the base64 JSON `X-Temporal-Metadata` header
//! 3. **ProtocolVersion** - `v1` (digest-addressed) and `v2` (explicitly keyed)
//!
//! ## Example
//!
//! ```rust
//! use blob_relay_protocol::{Digest, Metadata, encode_metadata_header, decode_metadata_header};
//!
//! let digest = Digest::sha256(b"hello world");
//! assert!(digest.to_string().starts_with("sha256:"));
//!
//! let mut metadata = Metadata::new();
//! metadata.insert("encoding".to_string(), b"binary/plain".to_vec());
//! let header = encode_metadata_header(&metadata).unwrap();
//! assert_eq!(decode_metadata_header(&header).unwrap(), metadata);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod digest;
pub mod error;
pub mod metadata;

pub use digest::{Digest, DigestAlgorithm, DigestHasher};
pub use error::{ProtocolError, Result};
pub use metadata::{decode_metadata_header, encode_metadata_header, serde_bytes_map, Metadata};

// =============================================================================
// Header, parameter and metadata names
// =============================================================================

/// Only content type accepted on blob requests
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Base64 JSON encoding of the payload metadata, sent on PUT
pub const HEADER_TEMPORAL_METADATA: &str = "X-Temporal-Metadata";

/// Size the client expects back on GET; echoed as the response Content-Length
pub const HEADER_EXPECTED_CONTENT_LENGTH: &str = "X-Payload-Expected-Content-Length";

/// Metadata entry marking a payload as an offloaded envelope; value is the version
pub const REMOTE_CODEC_METADATA_KEY: &str = "temporal.io/remote-codec";

/// Optional metadata entry selecting a custom storage path prefix
pub const KEY_PREFIX_METADATA_KEY: &str = "remote-codec/key-prefix";

/// Standard payload metadata entry naming the data encoding
pub const ENCODING_METADATA_KEY: &str = "encoding";

/// Encoding of envelope payloads
pub const ENCODING_JSON_PLAIN: &str = "json/plain";

// =============================================================================
// Protocol versions
// =============================================================================

/// Generation of the relay HTTP protocol.
///
/// `V1` addresses blobs by digest alone and is kept so that payloads written
/// by old clients stay readable. `V2` addresses blobs by an explicit key that
/// folds in namespace, digest and metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    V1,
    #[default]
    V2,
}

impl ProtocolVersion {
    /// The version new payloads are written with
    pub const LATEST: ProtocolVersion = ProtocolVersion::V2;

    /// Wire name, also used as the URL path segment
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "v1",
            ProtocolVersion::V2 => "v2",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "v1" => Ok(ProtocolVersion::V1),
            "v2" => Ok(ProtocolVersion::V2),
            other => Err(ProtocolError::UnknownVersion(other.to_string())),
        }
    }
}

/// Body of a successful PUT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyResponse {
    /// Key to pass back on GET
    pub key: String,
}
