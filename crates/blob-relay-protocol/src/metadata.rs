//! Payload metadata and its header encoding
//!
//! Workflow payload metadata is a `map<string, bytes>`. On the wire it travels
//! as JSON with each value base64-encoded, and on PUT the whole JSON document
//! is base64-encoded once more into the `X-Temporal-Metadata` header.

use crate::error::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;

/// Payload metadata. Ordered so that every serialization is deterministic.
pub type Metadata = BTreeMap<String, Vec<u8>>;

/// Encode metadata for the `X-Temporal-Metadata` header
pub fn encode_metadata_header(metadata: &Metadata) -> Result<String> {
    let json = serde_json::to_vec(&serde_bytes_map::Wrapper(metadata))?;
    Ok(STANDARD.encode(json))
}

/// Decode the `X-Temporal-Metadata` header.
///
/// JSON `null` yields an empty map. An empty header is not valid JSON and is
/// rejected.
pub fn decode_metadata_header(header: &str) -> Result<Metadata> {
    let json = STANDARD.decode(header.trim())?;
    let metadata: serde_bytes_map::Owned = serde_json::from_slice(&json)?;
    Ok(metadata.0)
}

/// Serde adapter for `map<string, bytes>` with base64 string values.
///
/// Use with `#[serde(with = "serde_bytes_map")]`.
pub mod serde_bytes_map {
    use super::Metadata;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(metadata: &Metadata, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(metadata.len()))?;
        for (key, value) in metadata {
            map.serialize_entry(key, &STANDARD.encode(value))?;
        }
        map.end()
    }

    /// A `null` map or a `null` value decodes as empty.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Metadata, D::Error> {
        let encoded: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
        encoded
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| {
                let value = value.unwrap_or_default();
                STANDARD
                    .decode(value.as_bytes())
                    .map(|bytes| (key.clone(), bytes))
                    .map_err(|e| D::Error::custom(format!("metadata entry '{}': {}", key, e)))
            })
            .collect()
    }

    pub(crate) struct Wrapper<'a>(pub &'a Metadata);

    impl Serialize for Wrapper<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serialize(self.0, serializer)
        }
    }

    pub(crate) struct Owned(pub Metadata);

    impl<'de> Deserialize<'de> for Owned {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserialize(deserializer).map(Owned)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn test_header_uses_base64_values() {
        let mut metadata = Metadata::new();
        metadata.insert("foo".to_string(), b"bar".to_vec());

        let header = encode_metadata_header(&metadata).unwrap();
        let json = STANDARD.decode(&header).unwrap();
        assert_eq!(json, br#"{"foo":"YmFy"}"#);

        assert_eq!(decode_metadata_header(&header).unwrap(), metadata);
    }

    #[test]
    fn test_null_and_empty_object_decode_to_empty_map() {
        assert!(decode_metadata_header(&STANDARD.encode("null")).unwrap().is_empty());
        assert!(decode_metadata_header(&STANDARD.encode("{}")).unwrap().is_empty());
    }

    #[test]
    fn test_null_value_decodes_to_empty_bytes() {
        let header = STANDARD.encode(r#"{"k":null,"foo":"YmFy"}"#);
        let metadata = decode_metadata_header(&header).unwrap();
        assert_eq!(metadata["k"], Vec::<u8>::new());
        assert_eq!(metadata["foo"], b"bar");
    }

    #[test]
    fn test_missing_header_is_rejected() {
        assert!(matches!(
            decode_metadata_header(""),
            Err(ProtocolError::MetadataJson(_))
        ));
    }

    #[test]
    fn test_garbage_header_is_rejected() {
        assert!(matches!(
            decode_metadata_header("not base64!"),
            Err(ProtocolError::MetadataEncoding(_))
        ));
        assert!(matches!(
            decode_metadata_header(&STANDARD.encode(r#"{"foo":"%%%"}"#)),
            Err(ProtocolError::MetadataJson(_))
        ));
    }
}
