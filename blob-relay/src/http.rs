//! HTTP server for the blob relay
//!
//! Routes by API version:
//!
//! - `/v1/...` - legacy handler (unless disabled)
//! - `/v2/...` - current handler
//! - anything else - `404 page not found`
//!
//! ## Example Usage
//!
//! ```bash
//! # Store a payload
//! curl -X PUT -H "Content-Type: application/octet-stream" \
//!      -H "X-Temporal-Metadata: $(echo -n '{}' | base64)" \
//!      --data-binary @payload.bin \
//!      "http://localhost:8577/v2/blobs/put?namespace=default&digest=sha256:<hex>"
//!
//! # Fetch it back
//! curl -H "Content-Type: application/octet-stream" \
//!      -H "X-Payload-Expected-Content-Length: <size>" \
//!      "http://localhost:8577/v2/blobs/get?key=<key>"
//! ```

use crate::config::RelayConfig;
use crate::error::StorageError;
use crate::handler::{not_found, BlobHandlerV1, BlobHandlerV2, RelayBody};
use crate::logging::Logger;
use crate::storage::StorageDriver;
use bytes::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// HTTP server state
pub struct HttpServer {
    v1: Option<BlobHandlerV1>,
    v2: BlobHandlerV2,
    bind_addr: SocketAddr,
    logger: Arc<dyn Logger>,
}

impl HttpServer {
    /// Create a new HTTP server over `driver`
    pub fn new(driver: Arc<dyn StorageDriver>, config: &RelayConfig, logger: Arc<dyn Logger>) -> Self {
        let options = config.handler_options();
        let v1 = config
            .enable_v1
            .then(|| BlobHandlerV1::with_options(driver.clone(), logger.clone(), options));

        Self {
            v1,
            v2: BlobHandlerV2::with_options(driver, logger.clone(), options),
            bind_addr: config.listen_addr,
            logger,
        }
    }

    /// Bind the configured address and serve until the task is dropped
    pub async fn run(self: Arc<Self>) -> Result<(), StorageError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), StorageError> {
        let local_addr = listener.local_addr()?;
        self.logger
            .info(&format!("HTTP server listening on {}", local_addr));

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(|req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle_request(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    server
                        .logger
                        .debug(&format!("connection error from {}: {}", remote_addr, err));
                }
            });
        }
    }

    /// Route a request to the handler for its API version
    pub async fn handle_request<B>(&self, req: Request<B>) -> Response<RelayBody>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.logger
            .debug(&format!("{} {}", req.method(), req.uri().path()));

        let path = req.uri().path();
        if path.starts_with("/v2/") {
            return self.v2.handle(req).await;
        }
        if path.starts_with("/v1/") {
            if let Some(v1) = &self.v1 {
                return v1.handle(req).await;
            }
        }
        not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::{body_text, request};
    use crate::logging::NoopLogger;
    use crate::storage::MemoryDriver;
    use hyper::{Method, StatusCode};

    fn server(enable_v1: bool) -> HttpServer {
        let config = RelayConfig {
            enable_v1,
            ..RelayConfig::default()
        };
        HttpServer::new(Arc::new(MemoryDriver::new()), &config, NoopLogger::shared())
    }

    #[tokio::test]
    async fn test_routes_by_version() {
        let server = server(true);
        for path in ["/v1/health/head", "/v2/health/head"] {
            let response = server
                .handle_request(request(Method::HEAD, path, &[], b""))
                .await;
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn test_disabled_v1_is_not_found() {
        let server = server(false);
        let response = server
            .handle_request(request(Method::HEAD, "/v1/health/head", &[], b""))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_prefix() {
        let server = server(true);
        for path in ["/", "/v3/health/head", "/health"] {
            let response = server
                .handle_request(request(Method::GET, path, &[], b""))
                .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_text(response).await.trim_end(), "404 page not found");
        }
    }
}
