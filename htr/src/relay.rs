//! Tunnel-open handshake and bidirectional byte relaying. One task per
//! accepted connection, bounded by a semaphore so a burst of enclave
//! connections can't exhaust host file descriptors.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use tunnel_core::config::Config;
use tunnel_core::framing::{read_frame, write_frame};
use tunnel_core::metrics::Metrics;
use tunnel_core::transport::{BoxedStream, Endpoint};
use tunnel_core::tunnel::{TunnelOpen, TunnelReply};

use crate::policy::is_blocked_target;

/// Long-lived relay sockets benefit from TCP keepalive so a silently
/// dead peer (NAT timeout, dropped link) doesn't pin a permit forever.
fn enable_keepalive(stream: &TcpStream) {
    let sock_ref = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
    if let Err(err) = sock_ref.set_tcp_keepalive(&keepalive) {
        warn!(%err, "failed to enable tcp keepalive on relay target socket");
    }
}

pub async fn run(config: Arc<Config>, metrics: Arc<Metrics>, listen: Endpoint) -> std::io::Result<()> {
    let listener = listen.listen().await?;
    let semaphore = Arc::new(Semaphore::new(config.htr_max_tunnels));
    info!(max_tunnels = config.htr_max_tunnels, "host tunnel relay listening");

    loop {
        let stream = listener.accept().await?;
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("tunnel concurrency cap reached, dropping connection");
                metrics.tunnels_rejected.inc();
                continue;
            }
        };

        let config = config.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = handle_tunnel(stream, &config, &metrics).await {
                warn!(%err, "tunnel session ended with an io error");
            }
        });
    }
}

async fn handle_tunnel(mut enclave: BoxedStream, config: &Config, metrics: &Metrics) -> std::io::Result<()> {
    eprintln!("DEBUG: handle_tunnel start");
    let open: TunnelOpen = match read_frame(&mut enclave).await {
        Ok(open) => open,
        Err(err) => {
            warn!(%err, "failed to read tunnel-open frame");
            return Ok(());
        }
    };
    eprintln!("DEBUG: read open frame {:?}", open.host);

    info!(host = %open.host, port = open.port, "tunnel open requested");

    if config.htr_reject_private_targets && is_blocked_target(&open.host).await {
        warn!(host = %open.host, "rejecting tunnel to a private or reserved target");
        metrics.tunnels_rejected.inc();
        let reply = TunnelReply::Error {
            message: "target not permitted".to_string(),
        };
        let _ = write_frame(&mut enclave, &reply).await;
        return Ok(());
    }

    let target = match tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((open.host.as_str(), open.port)),
    )
    .await
    {
        Ok(Ok(stream)) => {
            eprintln!("DEBUG: connected to target");
            enable_keepalive(&stream);
            stream
        }
        Ok(Err(err)) => {
            warn!(%err, host = %open.host, port = open.port, "failed to connect to target");
            let reply = TunnelReply::Error { message: err.to_string() };
            let _ = write_frame(&mut enclave, &reply).await;
            return Ok(());
        }
        Err(_) => {
            warn!(host = %open.host, port = open.port, "connect to target timed out");
            let reply = TunnelReply::Error {
                message: "connect timed out".to_string(),
            };
            let _ = write_frame(&mut enclave, &reply).await;
            return Ok(());
        }
    };

    write_frame(&mut enclave, &TunnelReply::Connected)
        .await
        .map_err(std::io::Error::other)?;
    eprintln!("DEBUG: wrote connected reply");
    metrics.tunnels_opened.inc();
    metrics.tunnels_active.inc();

    let result = forward_bidirectional(enclave, target, config.tunnel_buffer_bytes).await;
    eprintln!("DEBUG: forward_bidirectional returned {:?}", result);
    metrics.tunnels_active.dec();
    result
}

/// Runs both copy directions concurrently. A clean EOF on one side lets
/// the other keep running, independently reaching its own EOF (the
/// normal half-close sequence). An I/O error on either side, however,
/// cancels the other direction immediately and force-closes both
/// writers rather than waiting for it to unwind on its own.
async fn forward_bidirectional(
    enclave: BoxedStream,
    target: TcpStream,
    buffer_bytes: usize,
) -> std::io::Result<()> {
    let (mut enclave_r, mut enclave_w) = tokio::io::split(enclave);
    let (mut target_r, mut target_w) = target.into_split();

    let mut enclave_to_target = Box::pin(copy_with_half_close(&mut enclave_r, &mut target_w, buffer_bytes));
    let mut target_to_enclave = Box::pin(copy_with_half_close(&mut target_r, &mut enclave_w, buffer_bytes));

    let mut a_done = false;
    let mut b_done = false;
    let mut result = Ok(());

    while !a_done || !b_done {
        tokio::select! {
            res = &mut enclave_to_target, if !a_done => {
                a_done = true;
                if res.is_err() {
                    result = res;
                    break;
                }
            }
            res = &mut target_to_enclave, if !b_done => {
                b_done = true;
                if res.is_err() {
                    result = res;
                    break;
                }
            }
        }
    }

    drop(enclave_to_target);
    drop(target_to_enclave);

    if result.is_err() {
        let _ = enclave_w.shutdown().await;
        let _ = target_w.shutdown().await;
    }

    result
}

/// Forwards bytes until EOF, then shuts down the writer's own half.
/// The other direction keeps running independently.
async fn copy_with_half_close<R, W>(reader: &mut R, writer: &mut W, buffer_bytes: usize) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_bytes];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            let _ = writer.shutdown().await;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
    }
}
