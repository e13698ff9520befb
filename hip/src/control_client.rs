//! Sends a `ControlRequest` to the enclave sidecar over a pooled
//! connection, retrying on transport failure. Retries are unconditional
//! on method — the original host proxy retries every verb, including
//! non-idempotent ones, and this keeps that behavior rather than
//! silently tightening it.

use std::time::Duration;

use tracing::warn;

use tunnel_core::envelope::{ControlRequest, ControlResponse};
use tunnel_core::error::TunnelError;
use tunnel_core::framing::{read_frame, write_frame};
use tunnel_core::metrics::Metrics;

use crate::pool::ConnectionPool;

pub async fn send_with_retry(
    pool: &ConnectionPool,
    request: &ControlRequest,
    max_retries: u32,
    retry_delay: Duration,
    metrics: &Metrics,
) -> Result<ControlResponse, TunnelError> {
    metrics.control_requests_total.inc();
    let mut last_error = None;

    for attempt in 1..=max_retries.max(1) {
        match try_once(pool, request).await {
            Ok(response) => return Ok(response),
            Err(err) => {
                warn!(attempt, %err, "control channel attempt failed");
                last_error = Some(err);
                if attempt < max_retries {
                    metrics.control_retries_total.inc();
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| TunnelError::EnclaveUnavailable("no attempts made".to_string())))
}

async fn try_once(pool: &ConnectionPool, request: &ControlRequest) -> Result<ControlResponse, TunnelError> {
    let mut conn = pool
        .checkout()
        .await
        .map_err(|err| TunnelError::EnclaveUnavailable(err.to_string()))?;

    write_frame(&mut conn, request)
        .await
        .map_err(|err| TunnelError::EnclaveUnavailable(err.to_string()))?;

    let response: ControlResponse = read_frame(&mut conn)
        .await
        .map_err(|err| TunnelError::EnclaveUnavailable(err.to_string()))?;

    pool.checkin(conn).await;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_core::envelope::HeaderMap;
    use tunnel_core::transport::Endpoint;

    #[tokio::test]
    async fn retries_until_enclave_responds() {
        let listener = Endpoint::Tcp("127.0.0.1:0".parse().unwrap())
            .listen()
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().unwrap();

        tokio::spawn(async move {
            // First connection: accept then drop immediately without a
            // response, forcing a retry.
            let _first = listener.accept().await.unwrap();
            drop(_first);

            let mut second = listener.accept().await.unwrap();
            let _req: ControlRequest = read_frame(&mut second).await.unwrap();
            write_frame(
                &mut second,
                &ControlResponse::success(200, HeaderMap::new(), "ok".to_string()),
            )
            .await
            .unwrap();
        });

        let pool = ConnectionPool::new(Endpoint::Tcp(addr), 4, Duration::from_secs(30));
        let (_registry, metrics) = Metrics::new();
        let request = ControlRequest {
            method: "GET".to_string(),
            url: "https://example.com/".to_string(),
            headers: HeaderMap::new(),
            body: None,
        };

        let response = send_with_retry(&pool, &request, 3, Duration::from_millis(5), &metrics)
            .await
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn exhausting_retries_returns_enclave_unavailable() {
        let listener = Endpoint::Tcp("127.0.0.1:0".parse().unwrap())
            .listen()
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().unwrap();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok(conn) => drop(conn),
                    Err(_) => break,
                }
            }
        });

        let pool = ConnectionPool::new(Endpoint::Tcp(addr), 4, Duration::from_secs(30));
        let (_registry, metrics) = Metrics::new();
        let request = ControlRequest {
            method: "GET".to_string(),
            url: "https://example.com/".to_string(),
            headers: HeaderMap::new(),
            body: None,
        };

        let err = send_with_retry(&pool, &request, 2, Duration::from_millis(1), &metrics)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::EnclaveUnavailable(_)));
    }
}
