//! Enclave Sidecar: originates TLS directly against the remote endpoint
//! over a byte tunnel it does not trust the host to inspect. Never
//! serves plaintext HTTP and never lets TLS material cross back to HIP.

mod http1;
mod request;
mod tls;

use std::sync::Arc;

use tunnel_core::attestation;
use tunnel_core::config::Config;
use tunnel_core::envelope::ControlRequest;
use tunnel_core::framing::{read_frame_opt, write_frame};
use tunnel_core::logging;
use tunnel_core::metrics::Metrics;
use tunnel_core::transport::BoxedStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("es");
    let config = Arc::new(Config::from_env());
    let (_registry, metrics) = Metrics::new();
    let tls_config = Arc::new(tls::client_config()?);

    let doc = attestation::generate_attestation(None);
    tracing::info!(pcrs = ?doc.pcrs, timestamp = doc.timestamp, "enclave attestation generated");

    let listener = config.es_listen_endpoint().listen().await?;
    tracing::info!("enclave sidecar listening for control connections");

    loop {
        let stream = listener.accept().await?;
        let config = config.clone();
        let tls_config = tls_config.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, &config, tls_config, &metrics).await {
                tracing::warn!(%err, "control connection ended with an io error");
            }
        });
    }
}

async fn serve_connection(
    mut conn: BoxedStream,
    config: &Config,
    tls_config: Arc<rustls::ClientConfig>,
    metrics: &Metrics,
) -> std::io::Result<()> {
    loop {
        let request: ControlRequest = match read_frame_opt(&mut conn).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(err) => {
                tracing::warn!(%err, "failed to read control request frame, closing connection");
                return Ok(());
            }
        };

        let response = request::handle(&request, config, tls_config.clone(), metrics).await;
        write_frame(&mut conn, &response).await.map_err(std::io::Error::other)?;
    }
}
