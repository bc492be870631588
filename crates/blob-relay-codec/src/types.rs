//! Payload and envelope types

use blob_relay_protocol::{serde_bytes_map, Metadata};
use serde::{Deserialize, Serialize};

/// A workflow payload: metadata plus opaque data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub metadata: Metadata,
    pub data: Vec<u8>,
}

impl Payload {
    pub fn new(metadata: Metadata, data: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata,
            data: data.into(),
        }
    }

    /// Size of the payload in protobuf wire format.
    ///
    /// This is the size workflow histories account for, so the offload
    /// threshold is measured against it rather than the data alone.
    pub fn encoded_len(&self) -> usize {
        let metadata: usize = self
            .metadata
            .iter()
            .map(|(key, value)| {
                let entry = length_delimited(key.len()) + length_delimited(value.len());
                length_delimited(entry)
            })
            .sum();

        let data = if self.data.is_empty() {
            0
        } else {
            length_delimited(self.data.len())
        };

        metadata + data
    }
}

/// Tag byte + length varint + body
fn length_delimited(len: usize) -> usize {
    1 + varint_len(len as u64) + len
}

fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Reference stored in workflow history in place of an offloaded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePayload {
    /// Metadata of the original payload
    #[serde(with = "serde_bytes_map", default)]
    pub metadata: Metadata,
    /// Number of bytes in the original data
    pub size: u64,
    /// Digest of the original data, `sha256:<hex>`
    pub digest: String,
    /// Relay key to fetch the data with
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo_bar() -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("foo".into(), b"bar".to_vec());
        metadata
    }

    #[test]
    fn test_encoded_len_small_payload() {
        // entry: (1+1+3) + (1+1+3) = 10, field: 1+1+10 = 12, data: 1+1+11 = 13
        let payload = Payload::new(foo_bar(), b"hello world".to_vec());
        assert_eq!(payload.encoded_len(), 25);
    }

    #[test]
    fn test_encoded_len_empty_payload() {
        assert_eq!(Payload::default().encoded_len(), 0);

        let payload = Payload::new(Metadata::new(), vec![0u8; 300]);
        // 300 needs a two byte varint
        assert_eq!(payload.encoded_len(), 1 + 2 + 300);
    }

    #[test]
    fn test_varint_boundaries() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(16_383), 2);
        assert_eq!(varint_len(16_384), 3);
    }

    #[test]
    fn test_remote_payload_json_shape() {
        let remote = RemotePayload {
            metadata: foo_bar(),
            size: 3,
            digest: "sha256:abc".into(),
            key: "/blobs/ns/common/sha256:abc/sha256:def".into(),
        };
        let json = serde_json::to_string(&remote).unwrap();
        assert_eq!(
            json,
            r#"{"metadata":{"foo":"YmFy"},"size":3,"digest":"sha256:abc","key":"/blobs/ns/common/sha256:abc/sha256:def"}"#
        );

        let parsed: RemotePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, remote);
    }

    #[test]
    fn test_remote_payload_null_metadata() {
        let parsed: RemotePayload =
            serde_json::from_str(r#"{"metadata":null,"size":0,"digest":"sha256:00","key":"k"}"#)
                .unwrap();
        assert!(parsed.metadata.is_empty());
    }
}
