//! v1 blob handler (legacy)
//!
//! Kept so payloads written by v1 codecs stay readable. Keys are
//! `blobs/<digest>` with no namespace, no metadata hash and no checksum
//! verification. `/v1/blobs/upload` is an alias of `/v1/blobs/put`.

use super::{
    blob_response, body_stream, error_response, expected_length, health, key_response, not_found,
    request_metadata, require_octet_stream, upload_length, HandlerOptions, Query, RelayBody,
};
use crate::error::RelayError;
use crate::keys::legacy_key;
use crate::logging::Logger;
use crate::storage::{GetRequest, PutRequest, StorageDriver};
use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

pub struct BlobHandlerV1 {
    driver: Arc<dyn StorageDriver>,
    logger: Arc<dyn Logger>,
    max_blob_bytes: u64,
}

impl BlobHandlerV1 {
    pub fn new(driver: Arc<dyn StorageDriver>, logger: Arc<dyn Logger>) -> Self {
        Self::with_options(driver, logger, HandlerOptions::default())
    }

    pub fn with_options(
        driver: Arc<dyn StorageDriver>,
        logger: Arc<dyn Logger>,
        options: HandlerOptions,
    ) -> Self {
        Self {
            driver,
            logger,
            max_blob_bytes: options.max_blob_bytes,
        }
    }

    /// Route a request under `/v1/`
    pub async fn handle<B>(&self, req: Request<B>) -> Response<RelayBody>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let result = match req.uri().path() {
            "/v1/health/head" => {
                return health(req.method(), self.driver.as_ref(), self.logger.as_ref()).await
            }
            "/v1/blobs/put" | "/v1/blobs/upload" => self.put_blob(req).await,
            "/v1/blobs/get" => self.get_blob(req).await,
            _ => return not_found(),
        };

        result.unwrap_or_else(|e| error_response(self.logger.as_ref(), e))
    }

    async fn put_blob<B>(&self, req: Request<B>) -> Result<Response<RelayBody>, RelayError>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.method() != Method::PUT {
            return Err(RelayError::MethodNotAllowed);
        }

        let (parts, body) = req.into_parts();
        require_octet_stream(&parts.headers)?;

        let query = Query::parse(parts.uri.query());
        let digest = query.require("digest")?;
        let content_length = upload_length(&parts.headers, self.max_blob_bytes)?;

        // Decoded for validation only; v1 keys ignore metadata
        request_metadata(&parts.headers)?;

        let key = legacy_key(digest);
        let mut data = body_stream(body);
        let stored = self
            .driver
            .put_payload(PutRequest {
                key: &key,
                digest,
                content_length,
                data: &mut data,
            })
            .await?;

        self.logger.info(&format!(
            "stored legacy blob key={} size={}",
            stored.key, content_length
        ));

        key_response(StatusCode::CREATED, stored.key)
    }

    async fn get_blob<B>(&self, req: Request<B>) -> Result<Response<RelayBody>, RelayError> {
        if req.method() != Method::GET {
            return Err(RelayError::MethodNotAllowed);
        }
        require_octet_stream(req.headers())?;

        let query = Query::parse(req.uri().query());
        let digest = query.require("digest")?;
        let expected = expected_length(req.headers())?;

        let key = legacy_key(digest);
        let blob = self.driver.get_payload(GetRequest { key: &key }).await?;

        Ok(blob_response(blob, expected, &key, self.logger.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::{body_bytes, body_text, get_headers, key_of, put_headers, request};
    use crate::logging::NoopLogger;
    use crate::storage::MemoryDriver;
    use blob_relay_protocol::{Digest, Metadata};

    fn handler() -> (BlobHandlerV1, Arc<MemoryDriver>) {
        let driver = Arc::new(MemoryDriver::new());
        (BlobHandlerV1::new(driver.clone(), NoopLogger::shared()), driver)
    }

    #[tokio::test]
    async fn test_put_and_upload_alias_then_get() {
        let (handler, driver) = handler();

        for (route, body) in [("put", b"first".as_slice()), ("upload", b"second".as_slice())] {
            let digest = Digest::sha256(body).to_string();
            let uri = format!("/v1/blobs/{}?digest={}", route, digest);
            let response = handler
                .handle(request(Method::PUT, &uri, &put_headers(body, &Metadata::new()), body))
                .await;
            assert_eq!(response.status(), StatusCode::CREATED);
            assert_eq!(key_of(response).await, format!("blobs/{}", digest));

            let uri = format!("/v1/blobs/get?digest={}", digest);
            let response = handler
                .handle(request(Method::GET, &uri, &get_headers(body.len()), b""))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_bytes(response).await, body);
        }

        assert_eq!(driver.len().await, 2);
    }

    #[tokio::test]
    async fn test_put_does_not_verify_checksum() {
        let (handler, driver) = handler();
        let body = b"anything";
        let uri = "/v1/blobs/put?digest=sha256:notreallyahash";
        let response = handler
            .handle(request(Method::PUT, uri, &put_headers(body, &Metadata::new()), body))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(driver.keys().await, vec!["blobs/sha256:notreallyahash".to_string()]);
    }

    #[tokio::test]
    async fn test_digest_required() {
        let (handler, _) = handler();
        let response = handler
            .handle(request(Method::GET, "/v1/blobs/get", &get_headers(1), b""))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "digest query parameter is required");
    }

    #[tokio::test]
    async fn test_get_missing_blob() {
        let (handler, _) = handler();
        let response = handler
            .handle(request(
                Method::GET,
                "/v1/blobs/get?digest=sha256:00",
                &get_headers(3),
                b"",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "blob not found: <nil>");
    }

    #[tokio::test]
    async fn test_health_and_method_checks() {
        let (handler, _) = handler();
        let response = handler
            .handle(request(Method::HEAD, "/v1/health/head", &[], b""))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = handler
            .handle(request(Method::GET, "/v1/blobs/put?digest=sha256:00", &[], b""))
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
