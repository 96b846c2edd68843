//! Example gRPC server reporting call timings to statsd
//!
//! Run with:
//! cargo run --example server
//!
//! Then watch the agent port, e.g. `nc -u -l 8125`, and call
//! `grpcurl -plaintext localhost:50051 grpc.health.v1.Health/Check`.

use anyhow::Context;
use grpc_statsd::{udp_client, StatsdLayer, TimingSink};
use grpc_statsd_common::{init_from_config, AppConfig};
use std::sync::Arc;
use tonic::transport::Server;
use tonic_health::server::health_reporter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_from_config(&config.telemetry)?;

    let client = udp_client(&config.statsd).context("Failed to create statsd client")?;
    let sink: Arc<dyn TimingSink> = Arc::new(client);

    let addr = config.server_addr()?;
    let (_reporter, health_service) = health_reporter();

    tracing::info!(
        %addr,
        statsd = %format!("{}:{}", config.statsd.host, config.statsd.port),
        "Starting gRPC server example"
    );

    Server::builder()
        .layer(StatsdLayer::new(Some(sink), Some(config.middleware.options())))
        .add_service(health_service)
        .serve(addr)
        .await
        .context("Server error")?;

    Ok(())
}
