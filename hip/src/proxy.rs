//! HTTP front door: `/health`, `/metrics`, and a proxy fallback that
//! forwards every other request to the enclave sidecar over the control
//! channel. HIP never originates TLS itself — only ES does.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use prometheus_client::registry::Registry;
use tracing::info;

use tunnel_core::config::Config;
use tunnel_core::envelope::{ControlRequest, ControlResponse, HeaderMap as WireHeaders};
use tunnel_core::error::TunnelError;
use tunnel_core::metrics::{self, Metrics};

use crate::control_client;
use crate::pool::ConnectionPool;
use crate::target_url;

const HOP_BY_HOP: &[&str] = &["connection", "content-length", "host", "x-target-url"];

pub struct AppState {
    pub config: Arc<Config>,
    pub pool: Arc<ConnectionPool>,
    pub metrics: Arc<Metrics>,
    pub registry: Registry,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .fallback(any(proxy_request))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.config.es_dial_endpoint().connect().await {
        Ok(_stream) => (StatusCode::OK, "OK: proxy and enclave are healthy").into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Unhealthy: cannot connect to enclave: {err}"),
        )
            .into_response(),
    }
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    let text = metrics::encode_text(&state.registry);
    (
        StatusCode::OK,
        [("content-type", "application/openmetrics-text; version=1.0.0; charset=utf-8")],
        text,
    )
        .into_response()
}

async fn proxy_request(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_proxy_request(&state, method, &uri, &headers, body).await {
        Ok(response) => response,
        Err(err) => translate_error(err),
    }
}

async fn handle_proxy_request(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, TunnelError> {
    let url = target_url::resolve(uri, headers)?;

    let body_text = if body.is_empty() {
        None
    } else {
        Some(
            String::from_utf8(body.to_vec())
                .map_err(|_| TunnelError::BadRequest("request body is not valid UTF-8".to_string()))?,
        )
    };

    let mut wire_headers = WireHeaders::new();
    for (name, value) in headers.iter() {
        let name = name.as_str();
        if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            wire_headers.insert(name.to_string(), value.to_string());
        }
    }

    info!(method = %method, url, "routing request to enclave sidecar");

    let request = ControlRequest {
        method: method.to_string(),
        url,
        headers: wire_headers,
        body: body_text,
    };

    let response = control_client::send_with_retry(
        &state.pool,
        &request,
        state.config.max_retries,
        state.config.retry_delay,
        &state.metrics,
    )
    .await?;

    Ok(translate_response(response, &state.metrics))
}

fn translate_response(response: ControlResponse, metrics: &Metrics) -> Response {
    match response {
        ControlResponse::Success { status, headers, body, .. } => {
            metrics.requests_succeeded_total.inc();
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let mut builder = Response::builder().status(status);
            let mut content_type = None;
            for (name, value) in headers.iter() {
                let lower = name.to_ascii_lowercase();
                if lower == "content-length" || lower == "connection" {
                    continue;
                }
                if lower == "content-type" {
                    content_type = Some(value.clone());
                }
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = builder.header("content-type", content_type.unwrap_or_else(|| "text/plain".to_string()));
            builder = builder.header("content-length", body.len().to_string());
            builder.body(axum::body::Body::from(body)).unwrap_or_else(|_| {
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to build response").into_response()
            })
        }
        ControlResponse::Failure { status, error, .. } => {
            metrics.requests_failed_total.inc();
            tracing::warn!(enclave_status = status, error, "enclave reported a failure");
            (StatusCode::SERVICE_UNAVAILABLE, error).into_response()
        }
    }
}

fn translate_error(err: TunnelError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_list_is_lowercase() {
        for name in HOP_BY_HOP {
            assert_eq!(*name, name.to_ascii_lowercase());
        }
    }
}
