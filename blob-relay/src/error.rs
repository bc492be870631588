//! Error types for blob-relay

use hyper::StatusCode;
use thiserror::Error;

/// Errors raised by storage drivers
#[derive(Error, Debug)]
pub enum StorageError {
    /// The key has never been stored (or was deleted). The optional cause is
    /// the backend's own error text.
    #[error("blob not found: {}", .0.as_deref().unwrap_or("<nil>"))]
    BlobNotFound(Option<String>),

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while deriving a storage key
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("namespace must not be empty")]
    EmptyNamespace,

    #[error("'{0}' is not a valid prefix")]
    InvalidPrefix(String),
}

/// Request-boundary errors; each maps onto one HTTP status
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("length required")]
    LengthRequired,

    #[error("payload exceeds max size of {0} bytes")]
    PayloadTooLarge(u64),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Protocol(#[from] blob_relay_protocol::ProtocolError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("storage backend is unhealthy: {0}")]
    Unhealthy(StorageError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_)
            | RelayError::ChecksumMismatch
            | RelayError::Key(_)
            | RelayError::Protocol(_)
            | RelayError::Storage(StorageError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::LengthRequired => StatusCode::LENGTH_REQUIRED,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Storage(StorageError::BlobNotFound(_)) => StatusCode::NOT_FOUND,
            RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Unhealthy(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Plain-text response body. Method and length errors carry none.
    pub fn body(&self) -> Option<String> {
        match self {
            RelayError::MethodNotAllowed | RelayError::LengthRequired => None,
            other => Some(other.to_string()),
        }
    }
}
