//! Host Ingress Proxy: the local HTTP front door. Forwards request
//! metadata to the enclave over a pooled control channel; never
//! originates TLS itself.

mod control_client;
mod pool;
mod proxy;
mod target_url;

use std::sync::Arc;

use tunnel_core::config::Config;
use tunnel_core::logging;
use tunnel_core::metrics::Metrics;

use crate::pool::ConnectionPool;
use crate::proxy::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("hip");
    let config = Arc::new(Config::from_env());
    let (registry, metrics) = Metrics::new();

    let pool = Arc::new(ConnectionPool::new(
        config.es_dial_endpoint(),
        config.hip_pool_max,
        config.hip_pool_idle,
    ));
    pool.clone().spawn_reaper();

    let state = Arc::new(AppState {
        config: config.clone(),
        pool,
        metrics,
        registry,
    });

    let bind_addr = config.hip_http_bind_addr();
    tracing::info!(
        addr = %bind_addr,
        health = format!("http://{bind_addr}/health"),
        "host ingress proxy listening"
    );

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, proxy::router(state)).await?;
    Ok(())
}
