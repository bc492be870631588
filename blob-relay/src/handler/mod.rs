//! Versioned blob HTTP handlers
//!
//! - `v1` keeps payloads written by old codecs readable: key = `blobs/<digest>`
//! - `v2` derives keys from namespace, digest and metadata, dedups existing
//!   blobs and verifies the checksum while streaming
//!
//! Both are generic over the request body so they can be driven by hyper's
//! `Incoming` in production and by in-memory bodies in tests.

use crate::error::RelayError;
use crate::logging::Logger;
use crate::storage::{ByteStream, GetResponse, StorageDriver};
use blob_relay_protocol::{
    decode_metadata_header, Digest, DigestHasher, KeyResponse, Metadata,
    CONTENT_TYPE_OCTET_STREAM, HEADER_EXPECTED_CONTENT_LENGTH, HEADER_TEMPORAL_METADATA,
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, BodyStream, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, Response, StatusCode};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pub mod v1;
pub mod v2;

pub use v1::BlobHandlerV1;
pub use v2::BlobHandlerV2;

/// Response body type shared by every route
pub type RelayBody = UnsyncBoxBody<Bytes, io::Error>;

/// Default upper bound on an uploaded blob (1 GiB)
pub const DEFAULT_MAX_BLOB_BYTES: u64 = 1024 * 1024 * 1024;

/// Tunables shared by the handlers
#[derive(Debug, Clone, Copy)]
pub struct HandlerOptions {
    pub max_blob_bytes: u64,
    /// Hold a per-key lock across the v2 exist check and write
    pub serialize_same_key_puts: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            max_blob_bytes: DEFAULT_MAX_BLOB_BYTES,
            serialize_same_key_puts: true,
        }
    }
}

pub(crate) fn full(data: impl Into<Bytes>) -> RelayBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub(crate) fn empty() -> RelayBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub(crate) fn stream_body(data: ByteStream) -> RelayBody {
    StreamBody::new(data.map_ok(Frame::data)).boxed_unsync()
}

pub(crate) fn respond(status: StatusCode, body: RelayBody) -> Response<RelayBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

/// `404 page not found`, the body every unknown route gets
pub(crate) fn not_found() -> Response<RelayBody> {
    let mut response = respond(StatusCode::NOT_FOUND, full("404 page not found\n"));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// JSON `{"key": ...}` with the given status
pub(crate) fn key_response(status: StatusCode, key: String) -> Result<Response<RelayBody>, RelayError> {
    let mut body = serde_json::to_vec(&KeyResponse { key })
        .map_err(|e| RelayError::Validation(format!("failed to encode response: {}", e)))?;
    body.push(b'\n');

    let mut response = respond(status, full(body));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

/// Log the error (when it has a message) and turn it into a response
pub(crate) fn error_response(logger: &dyn Logger, err: RelayError) -> Response<RelayBody> {
    let status = err.status();
    match err.body() {
        Some(message) => {
            logger.error(&message);
            respond(status, full(message))
        }
        None => respond(status, empty()),
    }
}

/// `HEAD /vN/health/head`: 200 when the driver is usable
pub(crate) async fn health(
    method: &Method,
    driver: &dyn StorageDriver,
    logger: &dyn Logger,
) -> Response<RelayBody> {
    if method != Method::HEAD {
        return error_response(logger, RelayError::MethodNotAllowed);
    }

    if let Some(validatable) = driver.validatable() {
        if let Err(e) = validatable.validate().await {
            return error_response(logger, RelayError::Unhealthy(e));
        }
    }

    respond(StatusCode::OK, empty())
}

/// Decoded query string. The first value wins when a name repeats.
pub(crate) struct Query(HashMap<String, String>);

impl Query {
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = HashMap::new();
        if let Some(query) = query {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                params.entry(name.into_owned()).or_insert_with(|| value.into_owned());
            }
        }
        Self(params)
    }

    /// Parameter value, treating empty as absent
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Required parameter; missing yields `<name> query parameter is required`
    pub fn require(&self, name: &str) -> Result<&str, RelayError> {
        self.get(name)
            .ok_or_else(|| RelayError::Validation(format!("{} query parameter is required", name)))
    }
}

/// Header value as text. Missing and non-text values read as empty.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

pub(crate) fn require_octet_stream(headers: &HeaderMap) -> Result<(), RelayError> {
    if header_str(headers, header::CONTENT_TYPE.as_str()) != CONTENT_TYPE_OCTET_STREAM {
        return Err(RelayError::Validation(
            "missing or incorrect Content-Type header".to_string(),
        ));
    }
    Ok(())
}

/// Declared upload size, checked against the configured maximum
pub(crate) fn upload_length(headers: &HeaderMap, max_blob_bytes: u64) -> Result<u64, RelayError> {
    let raw = header_str(headers, header::CONTENT_LENGTH.as_str());
    if raw.is_empty() {
        return Err(RelayError::LengthRequired);
    }
    let length: u64 = raw.parse().map_err(|e| {
        RelayError::Validation(format!("invalid Content-Length header '{}': {}", raw, e))
    })?;
    if length > max_blob_bytes {
        return Err(RelayError::PayloadTooLarge(max_blob_bytes));
    }
    Ok(length)
}

/// `X-Payload-Expected-Content-Length`, required on GET
pub(crate) fn expected_length(headers: &HeaderMap) -> Result<u64, RelayError> {
    let raw = header_str(headers, HEADER_EXPECTED_CONTENT_LENGTH);
    if raw.is_empty() {
        return Err(RelayError::Validation(
            "expected content length header is required".to_string(),
        ));
    }
    raw.parse().map_err(|e| {
        RelayError::Validation(format!(
            "expected content length header {} is invalid: {}",
            raw, e
        ))
    })
}

/// 200 streaming a stored blob.
///
/// `Content-Length` is the size the client expects unless the driver knows
/// the blob is a different size; then the real size is sent and the client's
/// own size check reports the mismatch.
pub(crate) fn blob_response(
    blob: GetResponse,
    expected: u64,
    key: &str,
    logger: &dyn Logger,
) -> Response<RelayBody> {
    let length = match blob.content_length {
        Some(stored) if stored != expected => {
            logger.error(&format!(
                "stored blob size {} differs from expected {} key={}",
                stored, expected, key
            ));
            stored
        }
        _ => expected,
    };

    let mut response = respond(StatusCode::OK, stream_body(blob.data));
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    response
}

/// Metadata carried in `X-Temporal-Metadata`
pub(crate) fn request_metadata(headers: &HeaderMap) -> Result<Metadata, RelayError> {
    Ok(decode_metadata_header(header_str(headers, HEADER_TEMPORAL_METADATA))?)
}

/// Parse the `digest` parameter into the hash it must match
pub(crate) fn parse_digest(spec: &str) -> Result<Digest, RelayError> {
    Ok(Digest::parse(spec)?)
}

/// Adapt a hyper request body into a byte stream
pub(crate) fn body_stream<B>(body: B) -> ByteStream
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    BodyStream::new(body)
        .try_filter_map(|frame| async move { Ok(frame.into_data().ok()) })
        .map_err(io::Error::other)
        .boxed()
}

/// Hashes every chunk that flows through it.
///
/// The driver drains the stream; the handler finalizes the hash afterwards.
pub(crate) struct HashingStream<S> {
    inner: S,
    hasher: DigestHasher,
}

impl<S> HashingStream<S> {
    pub fn new(inner: S, hasher: DigestHasher) -> Self {
        Self { inner, hasher }
    }

    pub fn finalize(self) -> Digest {
        self.hasher.finalize()
    }
}

impl<S> Stream for HashingStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            this.hasher.update(chunk);
        }
        polled
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use blob_relay_protocol::encode_metadata_header;
    use hyper::Request;

    /// Request with an in-memory body and the given headers
    pub fn request(method: Method, uri: &str, headers: &[(&str, String)], body: &[u8]) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        builder.body(Full::new(Bytes::copy_from_slice(body))).unwrap()
    }

    /// Headers a well-formed PUT carries
    pub fn put_headers(body: &[u8], metadata: &Metadata) -> Vec<(&'static str, String)> {
        vec![
            ("content-type", CONTENT_TYPE_OCTET_STREAM.to_string()),
            ("content-length", body.len().to_string()),
            (HEADER_TEMPORAL_METADATA, encode_metadata_header(metadata).unwrap()),
        ]
    }

    pub fn get_headers(expected: usize) -> Vec<(&'static str, String)> {
        vec![
            ("content-type", CONTENT_TYPE_OCTET_STREAM.to_string()),
            (HEADER_EXPECTED_CONTENT_LENGTH, expected.to_string()),
        ]
    }

    pub async fn body_bytes(response: Response<RelayBody>) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    pub async fn body_text(response: Response<RelayBody>) -> String {
        String::from_utf8(body_bytes(response).await).unwrap()
    }

    pub async fn key_of(response: Response<RelayBody>) -> String {
        let parsed: KeyResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        parsed.key
    }
}
