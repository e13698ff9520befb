//! Shared Prometheus registry. Each binary registers only the metrics it
//! produces; HIP exposes the text encoding on `/metrics` beside `/health`.

use std::sync::Arc;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Debug, Default)]
pub struct Metrics {
    pub tunnels_active: Gauge,
    pub tunnels_opened: Counter,
    pub tunnels_rejected: Counter,
    pub control_requests_total: Counter,
    pub control_retries_total: Counter,
    pub requests_succeeded_total: Counter,
    pub requests_failed_total: Counter,
}

impl Metrics {
    pub fn new() -> (Registry, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::default());
        let mut registry = Registry::default();
        registry.register(
            "tunnels_active",
            "Number of tunnel connections currently open",
            metrics.tunnels_active.clone(),
        );
        registry.register(
            "tunnels_opened_total",
            "Total tunnel connections opened",
            metrics.tunnels_opened.clone(),
        );
        registry.register(
            "tunnels_rejected_total",
            "Total tunnel-open requests rejected by policy",
            metrics.tunnels_rejected.clone(),
        );
        registry.register(
            "control_requests_total",
            "Total control-channel requests sent by HIP",
            metrics.control_requests_total.clone(),
        );
        registry.register(
            "control_retries_total",
            "Total control-channel retries performed by HIP",
            metrics.control_retries_total.clone(),
        );
        registry.register(
            "requests_succeeded_total",
            "Total proxied requests that completed successfully",
            metrics.requests_succeeded_total.clone(),
        );
        registry.register(
            "requests_failed_total",
            "Total proxied requests that ended in an error response",
            metrics.requests_failed_total.clone(),
        );
        (registry, metrics)
    }
}

pub fn encode_text(registry: &Registry) -> String {
    let mut buf = String::new();
    if let Err(err) = encode(&mut buf, registry) {
        tracing::error!(%err, "failed to encode metrics");
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_encodes_registered_metrics() {
        let (registry, metrics) = Metrics::new();
        metrics.tunnels_active.set(2);
        metrics.tunnels_opened.inc();
        let text = encode_text(&registry);
        assert!(text.contains("tunnels_active"));
        assert!(text.contains("tunnels_opened_total"));
    }
}
