//! Codec configuration

use blob_relay_protocol::ProtocolVersion;

/// Default offload threshold (128KB).
///
/// Also the smallest object size eligible for tiered cloud storage classes.
pub const DEFAULT_MIN_BYTES: usize = 128_000;

/// Remote codec configuration
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Base URL of the blob relay (required)
    pub url: String,
    /// Workflow namespace the payloads belong to (required)
    pub namespace: String,
    /// HTTP client to use; a default client otherwise
    pub client: Option<reqwest::Client>,
    /// Payloads whose wire size exceeds this are offloaded (default: 128000)
    pub min_bytes: usize,
    /// Relay API version new payloads are written with (default: v2)
    pub version: ProtocolVersion,
    /// Never offload, only resolve existing references
    pub decode_only: bool,
    /// Extra headers sent on every relay request (auth, tracing)
    pub headers: Vec<(String, String)>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            namespace: String::new(),
            client: None,
            min_bytes: DEFAULT_MIN_BYTES,
            version: ProtocolVersion::LATEST,
            decode_only: false,
            headers: Vec::new(),
        }
    }
}

impl CodecConfig {
    /// Config with the two required fields set
    pub fn new(url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}
