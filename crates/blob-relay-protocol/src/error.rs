//! Error types for blob-relay-protocol

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid digest format '{0}'")]
    InvalidDigestFormat(String),

    #[error("invalid hash type '{0}'")]
    UnsupportedHashType(String),

    #[error("unknown protocol version '{0}'")]
    UnknownVersion(String),

    #[error("metadata header is not valid base64: {0}")]
    MetadataEncoding(#[from] base64::DecodeError),

    #[error("metadata header is not a valid JSON map: {0}")]
    MetadataJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
