//! Control-plane server binary

use anyhow::Context;
use porthole_api::{ApiServer, ApiServerConfig};
use porthole_api::store::StoreConfig;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind_addr: SocketAddr = env_or("PORTHOLE_BIND", "127.0.0.1:3001")
        .parse()
        .context("invalid PORTHOLE_BIND address")?;

    let config = ApiServerConfig {
        bind_addr,
        enable_cors: true,
        store: StoreConfig {
            public_base_url: env_or("PORTHOLE_PUBLIC_BASE_URL", "http://localhost:3002"),
            edge_base_url: env_or("PORTHOLE_EDGE_BASE_URL", "ws://localhost:3002"),
        },
    };

    ApiServer::new(config).start().await
}
