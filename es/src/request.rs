//! Orchestrates one control request end to end: open a tunnel through
//! HTR, originate TLS over it, speak HTTP/1.1 to the origin, and fold
//! every failure mode into the shared error taxonomy.

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tokio::io::AsyncWriteExt;
use url::Url;

use tunnel_core::config::Config;
use tunnel_core::envelope::{ControlRequest, ControlResponse};
use tunnel_core::error::TunnelError;
use tunnel_core::framing::{read_frame, write_frame};
use tunnel_core::metrics::Metrics;
use tunnel_core::transport::{BoxedStream, Endpoint};
use tunnel_core::tunnel::{TunnelOpen, TunnelReply};

use crate::http1;
use crate::tls;

pub async fn handle(
    request: &ControlRequest,
    config: &Config,
    tls_config: Arc<ClientConfig>,
    metrics: &Metrics,
) -> ControlResponse {
    match tokio::time::timeout(config.outbound_timeout, process(request, config, tls_config)).await {
        Ok(Ok(response)) => {
            metrics.requests_succeeded_total.inc();
            response
        }
        Ok(Err(err)) => {
            tracing::warn!(method = %request.method, url = %request.url, error = %err, "request failed");
            metrics.requests_failed_total.inc();
            err.into_control_response()
        }
        Err(_) => {
            tracing::warn!(method = %request.method, url = %request.url, "request exceeded outbound timeout");
            metrics.requests_failed_total.inc();
            TunnelError::Timeout("outbound request exceeded the configured timeout".to_string())
                .into_control_response()
        }
    }
}

async fn process(
    request: &ControlRequest,
    config: &Config,
    tls_config: Arc<ClientConfig>,
) -> Result<ControlResponse, TunnelError> {
    process_via(request, config, tls_config, config.htr_dial_endpoint()).await
}

/// Same as `process`, but dials `htr_endpoint` instead of always going
/// through `config.htr_dial_endpoint()` — lets tests substitute a
/// loopback `Endpoint::Tcp` for the real vsock target.
async fn process_via(
    request: &ControlRequest,
    config: &Config,
    tls_config: Arc<ClientConfig>,
    htr_endpoint: Endpoint,
) -> Result<ControlResponse, TunnelError> {
    if request.method.trim().is_empty() {
        return Err(TunnelError::BadRequest("method must not be empty".to_string()));
    }

    let url = Url::parse(&request.url).map_err(|err| TunnelError::BadRequest(format!("invalid url: {err}")))?;
    if url.scheme() != "https" {
        return Err(TunnelError::BadRequest(format!(
            "only https urls are supported, got scheme: {}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| TunnelError::BadRequest("url has no host".to_string()))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(443);
    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    let authority = if port == 443 { host.clone() } else { format!("{host}:{port}") };

    let tunnel = open_tunnel(htr_endpoint, config.connect_timeout, &host, port).await?;

    let tls_stream = match tokio::time::timeout(config.tls_handshake_timeout, tls::connect(tls_config, &host, tunnel)).await
    {
        Ok(result) => result?,
        Err(_) => return Err(TunnelError::TlsHandshakeFailed("tls handshake timed out".to_string())),
    };

    let (mut read_half, mut write_half) = tokio::io::split(tls_stream);

    http1::write_request(
        &mut write_half,
        &request.method,
        &target,
        &authority,
        &request.headers,
        request.body.as_deref(),
    )
    .await?;

    let parsed = http1::read_response(&mut read_half).await?;

    if let Err(err) = write_half.shutdown().await {
        tracing::warn!(error = %err, "failed to send tls close-notify");
    }

    Ok(ControlResponse::success(parsed.status, parsed.headers, parsed.body))
}

async fn open_tunnel(
    endpoint: Endpoint,
    connect_timeout: Duration,
    host: &str,
    port: u16,
) -> Result<BoxedStream, TunnelError> {
    let mut stream = match tokio::time::timeout(connect_timeout, endpoint.connect()).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => return Err(TunnelError::TunnelFailed(err.to_string())),
        Err(_) => return Err(TunnelError::TunnelFailed("timed out connecting to the host tunnel relay".to_string())),
    };

    write_frame(
        &mut stream,
        &TunnelOpen {
            host: host.to_string(),
            port,
        },
    )
    .await
    .map_err(|err| TunnelError::TunnelFailed(err.to_string()))?;

    let reply: TunnelReply = read_frame(&mut stream)
        .await
        .map_err(|err| TunnelError::TunnelFailed(err.to_string()))?;

    match reply {
        TunnelReply::Connected => Ok(stream),
        TunnelReply::Error { message } => Err(TunnelError::TunnelFailed(message)),
    }
}
