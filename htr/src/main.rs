//! Host Tunnel Relay: bridges the enclave sidecar's opaque tunnel bytes
//! to a raw TCP socket on the public network. Never inspects payload.

mod policy;
mod relay;

use std::sync::Arc;

use tunnel_core::config::Config;
use tunnel_core::logging;
use tunnel_core::metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("htr");
    let config = Arc::new(Config::from_env());
    let (_registry, metrics) = Metrics::new();
    let listen = config.htr_listen_endpoint();
    relay::run(config, metrics, listen).await?;
    Ok(())
}
