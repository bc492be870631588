//! Error types for the remote codec

use thiserror::Error;

/// Remote codec error
#[derive(Debug, Error)]
pub enum CodecError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Digest or metadata header could not be handled
    #[error(transparent)]
    Protocol(#[from] blob_relay_protocol::ProtocolError),

    /// Relay answered with an unexpected status
    #[error("server returned status code {status}: {message}")]
    Server { status: u16, message: String },

    /// Downloaded blob is not the size the envelope declares
    #[error("wanted object of size {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Downloaded blob does not hash to the envelope digest
    #[error("wanted object sha {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Envelope carries a codec marker this codec does not speak
    #[error("unknown version for temporal.io/remote-codec: {0}")]
    UnknownCodecVersion(String),

    /// Envelope data is not a remote payload reference
    #[error("invalid remote payload envelope: {0}")]
    Envelope(String),

    /// Health probe failed
    #[error("got status code {status} from storage service at {url}")]
    Unhealthy { status: u16, url: String },

    /// Codec configuration is unusable
    #[error("invalid codec configuration: {0}")]
    Config(String),
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
