//! Remote payload codec backed by a blob relay

use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::types::{Payload, RemotePayload};
use async_trait::async_trait;
use blob_relay_protocol::{
    encode_metadata_header, Digest, KeyResponse, Metadata, ProtocolVersion,
    CONTENT_TYPE_OCTET_STREAM, ENCODING_JSON_PLAIN, ENCODING_METADATA_KEY,
    HEADER_EXPECTED_CONTENT_LENGTH, HEADER_TEMPORAL_METADATA, REMOTE_CODEC_METADATA_KEY,
};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

/// Transforms payloads on their way into and out of workflow history
#[async_trait]
pub trait PayloadCodec: Send + Sync {
    async fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>>;
    async fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>>;
}

/// Offloads oversized payloads to a blob relay and resolves them back
///
/// # Example
///
/// ```rust,no_run
/// use blob_relay_codec::{CodecConfig, Payload, RemoteCodec};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let codec = RemoteCodec::connect(CodecConfig::new("http://localhost:8577", "default")).await?;
///
/// let encoded = codec.encode(vec![Payload::new(Default::default(), vec![0u8; 500_000])]).await?;
/// let _decoded = codec.decode(encoded).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RemoteCodec {
    client: Client,
    base_url: Url,
    namespace: String,
    min_bytes: usize,
    version: ProtocolVersion,
    decode_only: bool,
    headers: HeaderMap,
}

impl RemoteCodec {
    /// Validate `config` and build a codec. No request is made.
    pub fn new(config: CodecConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(CodecError::Config("a remote codec URL is required".into()));
        }
        let base_url = Url::parse(&config.url)
            .map_err(|e| CodecError::Config(format!("invalid remote codec URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CodecError::Config(format!(
                "invalid remote codec URL: {}",
                config.url
            )));
        }

        if config.namespace.is_empty() {
            return Err(CodecError::Config("a namespace is required".into()));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CodecError::Config(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CodecError::Config(format!("invalid value for header {}: {}", name, e)))?;
            headers.append(name, value);
        }

        Ok(Self {
            client: config.client.unwrap_or_default(),
            base_url,
            namespace: config.namespace,
            min_bytes: config.min_bytes,
            version: config.version,
            decode_only: config.decode_only,
            headers,
        })
    }

    /// Build a codec and make sure the relay answers its health probe
    pub async fn connect(config: CodecConfig) -> Result<Self> {
        let codec = Self::new(config)?;
        codec.check_health().await?;
        Ok(codec)
    }

    /// `HEAD <url>/<version>/health/head`
    pub async fn check_health(&self) -> Result<()> {
        let url = self.endpoint(self.version, &["health", "head"])?;
        let response = self
            .client
            .head(url.clone())
            .headers(self.headers.clone())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(CodecError::Unhealthy {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }

    /// Offload every payload whose wire size exceeds the threshold
    pub async fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>> {
        if self.decode_only {
            return Ok(payloads);
        }

        let mut result = Vec::with_capacity(payloads.len());
        for payload in payloads {
            if payload.encoded_len() > self.min_bytes {
                result.push(self.encode_payload(&payload).await?);
            } else {
                result.push(payload);
            }
        }
        Ok(result)
    }

    /// Resolve every payload carrying the remote codec marker
    pub async fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>> {
        let mut result = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let version = match payload.metadata.get(REMOTE_CODEC_METADATA_KEY) {
                Some(marker) => marker_version(marker)?,
                None => {
                    result.push(payload);
                    continue;
                }
            };
            result.push(self.decode_payload(&payload, version).await?);
        }
        Ok(result)
    }

    async fn encode_payload(&self, payload: &Payload) -> Result<Payload> {
        let digest = Digest::sha256(&payload.data).to_string();

        let mut url = self.endpoint(self.version, &["blobs", "put"])?;
        url.query_pairs_mut()
            .append_pair("digest", &digest)
            .append_pair("namespace", &self.namespace);

        let response = self
            .client
            .put(url)
            .headers(self.headers.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE_OCTET_STREAM)
            .header(
                HEADER_TEMPORAL_METADATA,
                encode_metadata_header(&payload.metadata)?,
            )
            .body(payload.data.clone())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if status != StatusCode::CREATED && status != StatusCode::OK {
            return Err(CodecError::Server {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        let KeyResponse { key } = serde_json::from_slice(&body)?;

        debug!(
            key = %key,
            size = payload.data.len(),
            version = %self.version,
            "Offloaded payload"
        );

        let remote = RemotePayload {
            metadata: payload.metadata.clone(),
            size: payload.data.len() as u64,
            digest,
            key,
        };

        let mut metadata = Metadata::new();
        metadata.insert(
            ENCODING_METADATA_KEY.to_string(),
            ENCODING_JSON_PLAIN.as_bytes().to_vec(),
        );
        metadata.insert(
            REMOTE_CODEC_METADATA_KEY.to_string(),
            self.version.as_str().as_bytes().to_vec(),
        );

        Ok(Payload {
            metadata,
            data: serde_json::to_vec(&remote)?,
        })
    }

    async fn decode_payload(&self, payload: &Payload, version: ProtocolVersion) -> Result<Payload> {
        let remote: RemotePayload = serde_json::from_slice(&payload.data)
            .map_err(|e| CodecError::Envelope(e.to_string()))?;
        let expected = Digest::parse(&remote.digest)?;

        let mut url = self.endpoint(version, &["blobs", "get"])?;
        {
            let mut query = url.query_pairs_mut();
            match version {
                ProtocolVersion::V1 => query.append_pair("digest", &remote.digest),
                ProtocolVersion::V2 => query.append_pair("key", &remote.key),
            };
        }

        let mut response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE_OCTET_STREAM)
            .header(HEADER_EXPECTED_CONTENT_LENGTH, remote.size.to_string())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(CodecError::Server { status, message });
        }

        // Hash while streaming and stop as soon as the relay sends too much
        let mut hasher = expected.hasher();
        let mut data = Vec::with_capacity(remote.size.min(64 * 1024 * 1024) as usize);
        while let Some(chunk) = response.chunk().await? {
            let received = (data.len() + chunk.len()) as u64;
            if received > remote.size {
                return Err(CodecError::SizeMismatch {
                    expected: remote.size,
                    actual: received,
                });
            }
            hasher.update(&chunk);
            data.extend_from_slice(&chunk);
        }

        if data.len() as u64 != remote.size {
            return Err(CodecError::SizeMismatch {
                expected: remote.size,
                actual: data.len() as u64,
            });
        }

        let actual = hasher.finalize();
        if actual != expected {
            return Err(CodecError::DigestMismatch {
                expected: remote.digest,
                actual: actual.to_string(),
            });
        }

        debug!(key = %remote.key, size = remote.size, "Resolved payload");

        Ok(Payload {
            metadata: remote.metadata,
            data,
        })
    }

    /// `<base>/<version>/<segments...>`
    fn endpoint(&self, version: ProtocolVersion, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| CodecError::Config(format!("invalid remote codec URL: {}", self.base_url)))?
            .pop_if_empty()
            .push(version.as_str())
            .extend(segments);
        Ok(url)
    }
}

fn marker_version(marker: &[u8]) -> Result<ProtocolVersion> {
    std::str::from_utf8(marker)
        .ok()
        .and_then(|version| version.parse().ok())
        .ok_or_else(|| CodecError::UnknownCodecVersion(String::from_utf8_lossy(marker).into_owned()))
}

#[async_trait]
impl PayloadCodec for RemoteCodec {
    async fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>> {
        RemoteCodec::encode(self, payloads).await
    }

    async fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>> {
        RemoteCodec::decode(self, payloads).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url_and_namespace() {
        let err = RemoteCodec::new(CodecConfig::new("", "ns")).unwrap_err();
        assert!(err.to_string().contains("a remote codec URL is required"));

        let err = RemoteCodec::new(CodecConfig::new("http://localhost:8577", "")).unwrap_err();
        assert!(err.to_string().contains("a namespace is required"));

        let err = RemoteCodec::new(CodecConfig::new("not a url", "ns")).unwrap_err();
        assert!(matches!(err, CodecError::Config(_)));
    }

    #[test]
    fn test_invalid_custom_header() {
        let config = CodecConfig {
            headers: vec![("bad header".into(), "x".into())],
            ..CodecConfig::new("http://localhost:8577", "ns")
        };
        assert!(matches!(RemoteCodec::new(config), Err(CodecError::Config(_))));
    }

    #[test]
    fn test_endpoint_joins_base_path() {
        let codec = RemoteCodec::new(CodecConfig::new("http://relay.local/lps/", "ns")).unwrap();
        let url = codec
            .endpoint(ProtocolVersion::V2, &["blobs", "put"])
            .unwrap();
        assert_eq!(url.as_str(), "http://relay.local/lps/v2/blobs/put");

        let codec = RemoteCodec::new(CodecConfig::new("http://relay.local:8577", "ns")).unwrap();
        let url = codec
            .endpoint(ProtocolVersion::V1, &["health", "head"])
            .unwrap();
        assert_eq!(url.as_str(), "http://relay.local:8577/v1/health/head");
    }

    #[test]
    fn test_default_threshold() {
        let codec = RemoteCodec::new(CodecConfig::new("http://localhost:8577", "ns")).unwrap();
        assert_eq!(codec.min_bytes, 128_000);
        assert_eq!(codec.version, ProtocolVersion::V2);
    }

    #[test]
    fn test_marker_versions() {
        assert_eq!(marker_version(b"v1").unwrap(), ProtocolVersion::V1);
        assert_eq!(marker_version(b"v2").unwrap(), ProtocolVersion::V2);
        assert!(matches!(
            marker_version(b"v9"),
            Err(CodecError::UnknownCodecVersion(v)) if v == "v9"
        ));
    }

    #[tokio::test]
    async fn test_small_payloads_pass_through_without_network() {
        // Nothing listens on this port; any request would fail
        let codec = RemoteCodec::new(CodecConfig {
            min_bytes: 32,
            ..CodecConfig::new("http://127.0.0.1:9", "ns")
        })
        .unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("foo".into(), b"bar".to_vec());
        let payload = Payload::new(metadata, b"hello world".to_vec());

        let encoded = codec.encode(vec![payload.clone()]).await.unwrap();
        assert_eq!(encoded, vec![payload.clone()]);

        let decoded = codec.decode(encoded).await.unwrap();
        assert_eq!(decoded, vec![payload]);
    }

    #[tokio::test]
    async fn test_unknown_marker_rejected_before_network() {
        let codec = RemoteCodec::new(CodecConfig::new("http://127.0.0.1:9", "ns")).unwrap();
        let mut metadata = Metadata::new();
        metadata.insert(REMOTE_CODEC_METADATA_KEY.into(), b"v3".to_vec());

        let err = codec
            .decode(vec![Payload::new(metadata, b"{}".to_vec())])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown version for temporal.io/remote-codec: v3"
        );
    }
}
