//! Single immutable configuration record, loaded once at startup from a
//! small named-constant set with environment overrides. No file-based or
//! dynamic configuration — each binary consumes only the fields it needs.

use std::net::SocketAddr;
use std::time::Duration;

use tokio_vsock::VMADDR_CID_ANY;

use crate::transport::Endpoint;

#[derive(Debug, Clone)]
pub struct Config {
    pub hip_http_port: u16,

    pub es_cid: u32,
    pub es_port: u32,
    pub htr_cid: u32,
    pub htr_port: u32,

    pub max_retries: u32,
    pub retry_delay: Duration,

    pub tunnel_buffer_bytes: usize,
    pub outbound_timeout: Duration,
    pub connect_timeout: Duration,
    pub tls_handshake_timeout: Duration,

    pub htr_max_tunnels: usize,
    pub htr_reject_private_targets: bool,

    pub hip_pool_max: usize,
    pub hip_pool_idle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hip_http_port: 8080,
            es_cid: 3,
            es_port: 5000,
            htr_cid: 2,
            htr_port: 5001,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            tunnel_buffer_bytes: 8192,
            outbound_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            tls_handshake_timeout: Duration::from_secs(10),
            htr_max_tunnels: 1024,
            htr_reject_private_targets: false,
            hip_pool_max: 4,
            hip_pool_idle: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            hip_http_port: env_parsed("HIP_HTTP_PORT", defaults.hip_http_port),
            es_cid: env_parsed("ES_CID", defaults.es_cid),
            es_port: env_parsed("ES_PORT", defaults.es_port),
            htr_cid: env_parsed("HTR_CID", defaults.htr_cid),
            htr_port: env_parsed("HTR_PORT", defaults.htr_port),
            max_retries: env_parsed("MAX_RETRIES", defaults.max_retries),
            retry_delay: Duration::from_millis(env_parsed(
                "RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )),
            tunnel_buffer_bytes: env_parsed("TUNNEL_BUFFER_BYTES", defaults.tunnel_buffer_bytes),
            outbound_timeout: Duration::from_millis(env_parsed(
                "OUTBOUND_TIMEOUT_MS",
                defaults.outbound_timeout.as_millis() as u64,
            )),
            connect_timeout: Duration::from_millis(env_parsed(
                "CONNECT_TIMEOUT_MS",
                defaults.connect_timeout.as_millis() as u64,
            )),
            tls_handshake_timeout: Duration::from_millis(env_parsed(
                "TLS_HANDSHAKE_TIMEOUT_MS",
                defaults.tls_handshake_timeout.as_millis() as u64,
            )),
            htr_max_tunnels: env_parsed("HTR_MAX_TUNNELS", defaults.htr_max_tunnels),
            htr_reject_private_targets: env_parsed(
                "HTR_REJECT_PRIVATE_TARGETS",
                defaults.htr_reject_private_targets,
            ),
            hip_pool_max: env_parsed("HIP_POOL_MAX", defaults.hip_pool_max),
            hip_pool_idle: Duration::from_secs(env_parsed(
                "HIP_POOL_IDLE_SECS",
                defaults.hip_pool_idle.as_secs(),
            )),
        }
    }

    /// Address HIP's HTTP front door binds to. Host is always `0.0.0.0`;
    /// only the port is configurable.
    pub fn hip_http_bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.hip_http_port))
    }

    /// Address HIP (and ES, dialing HTR) use to reach the enclave sidecar.
    pub fn es_dial_endpoint(&self) -> Endpoint {
        Endpoint::Vsock {
            cid: self.es_cid,
            port: self.es_port,
        }
    }

    /// Address ES itself binds to.
    pub fn es_listen_endpoint(&self) -> Endpoint {
        Endpoint::Vsock {
            cid: VMADDR_CID_ANY,
            port: self.es_port,
        }
    }

    /// Address ES uses to reach the host tunnel relay.
    pub fn htr_dial_endpoint(&self) -> Endpoint {
        Endpoint::Vsock {
            cid: self.htr_cid,
            port: self.htr_port,
        }
    }

    /// Address HTR itself binds to.
    pub fn htr_listen_endpoint(&self) -> Endpoint {
        Endpoint::Vsock {
            cid: VMADDR_CID_ANY,
            port: self.htr_port,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "failed to parse environment override, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_named_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.es_cid, 3);
        assert_eq!(cfg.es_port, 5000);
        assert_eq!(cfg.htr_port, 5001);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay, Duration::from_secs(1));
        assert_eq!(cfg.tunnel_buffer_bytes, 8192);
    }

    #[test]
    fn hip_bind_addr_uses_the_fixed_host_and_configured_port() {
        let cfg = Config {
            hip_http_port: 9090,
            ..Config::default()
        };
        assert_eq!(cfg.hip_http_bind_addr(), "0.0.0.0:9090".parse().unwrap());
    }

    #[test]
    fn es_endpoints_share_port_but_differ_in_cid() {
        let cfg = Config::default();
        match (cfg.es_dial_endpoint(), cfg.es_listen_endpoint()) {
            (Endpoint::Vsock { cid: dial_cid, port: dial_port }, Endpoint::Vsock { cid: listen_cid, port: listen_port }) => {
                assert_eq!(dial_cid, 3);
                assert_eq!(listen_cid, VMADDR_CID_ANY);
                assert_eq!(dial_port, listen_port);
            }
            _ => panic!("expected vsock endpoints"),
        }
    }
}
