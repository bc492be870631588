//! Storage key derivation
//!
//! v2 keys separate the storage location from the checksum:
//!
//! ```text
//! /blobs/<namespace>/common/<digest>/<metadata-hash>
//! /blobs/<namespace>/custom/<prefix>/<digest>/<metadata-hash>
//! ```
//!
//! The custom form is used when the payload metadata carries
//! `remote-codec/key-prefix`. v1 keys are just `blobs/<digest>`.

use crate::error::KeyError;
use blob_relay_protocol::{Metadata, KEY_PREFIX_METADATA_KEY};
use regex::Regex;
use sha2::{Digest as _, Sha256};
use std::sync::LazyLock;

static PREFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z_\-/]+$").expect("prefix pattern compiles"));

fn is_valid_prefix(prefix: &str) -> bool {
    PREFIX_PATTERN.is_match(prefix)
}

/// Hash metadata as `sha256:<hex>` over `key || value` for each entry in
/// ascending key order.
pub fn hash_metadata(metadata: &Metadata) -> String {
    let mut hasher = Sha256::new();
    // BTreeMap iterates in key order
    for (key, value) in metadata {
        hasher.update(key.as_bytes());
        hasher.update(value);
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Derive the v2 storage key for a blob
pub fn compute_key(namespace: &str, digest: &str, metadata: &Metadata) -> Result<String, KeyError> {
    if namespace.is_empty() {
        return Err(KeyError::EmptyNamespace);
    }

    let metadata_hash = hash_metadata(metadata);
    let prefix = metadata
        .get(KEY_PREFIX_METADATA_KEY)
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .unwrap_or_default();

    if prefix.is_empty() {
        return Ok(format!(
            "/blobs/{}/common/{}/{}",
            namespace, digest, metadata_hash
        ));
    }

    if !is_valid_prefix(&prefix) {
        return Err(KeyError::InvalidPrefix(prefix));
    }

    Ok(format!(
        "/blobs/{}/custom/{}/{}/{}",
        namespace, prefix, digest, metadata_hash
    ))
}

/// v1 storage key: the digest under a flat `blobs/` directory
pub fn legacy_key(digest: &str) -> String {
    format!("blobs/{}", digest)
}
