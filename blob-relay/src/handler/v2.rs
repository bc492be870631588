//! v2 blob handler
//!
//! - `HEAD /v2/health/head`
//! - `PUT  /v2/blobs/put?namespace=<ns>&digest=sha256:<hex>`
//! - `GET  /v2/blobs/get?key=<key>`
//!
//! PUT derives the key from namespace, digest and the `X-Temporal-Metadata`
//! header. A blob already stored under that key is answered with 200 and
//! never rewritten. New uploads stream straight into the driver while being
//! hashed; the digest is compared once the driver has committed the data, so
//! a mismatching upload is stored but answered with 400.

use super::{
    blob_response, body_stream, error_response, expected_length, health, key_response,
    not_found, parse_digest, request_metadata, require_octet_stream, upload_length,
    HandlerOptions, HashingStream, Query, RelayBody,
};
use crate::error::RelayError;
use crate::keys::compute_key;
use crate::locks::KeyLocks;
use crate::logging::Logger;
use crate::storage::{GetRequest, PutRequest, StorageDriver};
use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

pub struct BlobHandlerV2 {
    driver: Arc<dyn StorageDriver>,
    logger: Arc<dyn Logger>,
    max_blob_bytes: u64,
    locks: Option<KeyLocks>,
}

impl BlobHandlerV2 {
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
            locks: options.serialize_same_key_puts.then(KeyLocks::new),
        }
    }

    /// Route a request under `/v2/`
    pub async fn handle<B>(&self, req: Request<B>) -> Response<RelayBody>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let result = match req.uri().path() {
            "/v2/health/head" => {
                return health(req.method(), self.driver.as_ref(), self.logger.as_ref()).await
            }
            "/v2/blobs/put" => self.put_blob(req).await,
            "/v2/blobs/get" => self.get_blob(req).await,
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
        let content_length = upload_length(&parts.headers, self.max_blob_bytes)?;

        let query = Query::parse(parts.uri.query());
        let namespace = query.require("namespace")?;
        let digest_param = query.require("digest")?;
        let digest = parse_digest(digest_param)?;

        let metadata = request_metadata(&parts.headers)?;
        let key = compute_key(namespace, digest_param, &metadata)?;

        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(&key).await),
            None => None,
        };

        if self.driver.exist_payload(&key).await? {
            self.logger.debug(&format!("blob already stored key={}", key));
            return key_response(StatusCode::OK, key);
        }

        let mut tee = HashingStream::new(body_stream(body), digest.hasher());
        let stored = self
            .driver
            .put_payload(PutRequest {
                key: &key,
                digest: digest_param,
                content_length,
                data: &mut tee,
            })
            .await?;

        let checksum = tee.finalize();
        if checksum.hex() != digest.hex() {
            return Err(RelayError::ChecksumMismatch);
        }

        self.logger.info(&format!(
            "stored blob key={} size={}",
            stored.key, content_length
        ));

        key_response(StatusCode::CREATED, stored.key)
    }

    async fn get_blob<B>(&self, req: Request<B>) -> Result<Response<RelayBody>, RelayError> {
        if req.method() != Method::GET {
            return Err(RelayError::MethodNotAllowed);
        }
        require_octet_stream(req.headers())?;
        let expected = expected_length(req.headers())?;

        let query = Query::parse(req.uri().query());
        let key_param = query.require("key")?;
        // Clients may escape the key before putting it in the query string
        let key = urlencoding::decode(key_param).map_err(|e| {
            RelayError::Validation(format!(
                "key query parameter {} cannot be unescaped: {}",
                key_param, e
            ))
        })?;

        let blob = self.driver.get_payload(GetRequest { key: &key }).await?;

        Ok(blob_response(blob, expected, &key, self.logger.as_ref()))
    }
}
