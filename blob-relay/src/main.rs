//! Blob Relay Daemon
//!
//! ## Usage
//!
//! ```bash
//! # In-memory storage on the default port (8577)
//! blob-relay
//!
//! # Files on local disk
//! blob-relay --driver file --storage-dir /data/blobs
//!
//! # S3 (build with --features object-store)
//! AWS_REGION=us-east-1 BUCKET=payloads blob-relay --driver s3
//!
//! # From a config file, overriding the listen address
//! blob-relay --config /etc/blob-relay.toml --listen 127.0.0.1:9000
//! ```

use anyhow::Context;
use blob_relay::{build_driver, DriverKind, HttpServer, RelayConfig, TracingLogger};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "blob-relay")]
#[command(about = "Content-addressed blob relay for oversized workflow payloads")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage driver
    #[arg(long, env = "DRIVER", value_enum)]
    driver: Option<DriverKind>,

    /// Address to listen on
    #[arg(long, env = "LISTEN")]
    listen: Option<SocketAddr>,

    /// Storage directory for the file driver
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Largest accepted upload in bytes
    #[arg(long)]
    max_blob_bytes: Option<u64>,

    /// Stop serving the legacy /v1/ routes
    #[arg(long)]
    disable_v1: bool,

    /// Bucket (or Azure container) for object store drivers
    #[arg(long, env = "BUCKET")]
    bucket: Option<String>,

    /// Region for the S3 driver
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("blob_relay=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        RelayConfig::load(config_path)
            .with_context(|| format!("failed to load config {}", config_path.display()))?
    } else {
        RelayConfig::default()
    };

    // Apply CLI overrides
    if let Some(driver) = args.driver {
        config.driver = driver;
    }
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(max) = args.max_blob_bytes {
        config.max_blob_bytes = max;
    }
    if args.disable_v1 {
        config.enable_v1 = false;
    }
    if args.bucket.is_some() {
        config.bucket = args.bucket;
    }
    if args.region.is_some() {
        config.region = args.region;
    }

    info!(
        driver = %config.driver,
        listen = %config.listen_addr,
        v1 = config.enable_v1,
        "Starting blob-relay"
    );

    let driver = build_driver(&config, TracingLogger::shared("storage"))
        .await
        .context("failed to create storage driver")?;

    if let Some(validatable) = driver.validatable() {
        validatable
            .validate()
            .await
            .context("storage driver validation failed")?;
    }

    let http_server = Arc::new(HttpServer::new(
        driver,
        &config,
        TracingLogger::shared("http"),
    ));

    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
                return Err(e.into());
            }
        }
        _ = shutdown => {}
    }

    Ok(())
}
