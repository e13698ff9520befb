//! Tunnel-channel handshake types (ES <-> HTR).

use serde::{Deserialize, Serialize};

/// First and only framed message ES sends HTR on a tunnel connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelOpen {
    pub host: String,
    pub port: u16,
}

/// HTR's reply to a `TunnelOpen`. After `Connected`, the connection
/// carries opaque bytes in both directions until either side closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TunnelReply {
    Connected,
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_open_round_trips() {
        let open = TunnelOpen {
            host: "example.com".to_string(),
            port: 443,
        };
        let encoded = serde_json::to_string(&open).unwrap();
        assert_eq!(encoded, r#"{"host":"example.com","port":443}"#);
        let decoded: TunnelOpen = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.host, "example.com");
        assert_eq!(decoded.port, 443);
    }

    #[test]
    fn tunnel_reply_connected_matches_wire_shape() {
        let reply = TunnelReply::Connected;
        let encoded = serde_json::to_string(&reply).unwrap();
        assert_eq!(encoded, r#"{"status":"connected"}"#);
    }

    #[test]
    fn tunnel_reply_error_matches_wire_shape() {
        let reply = TunnelReply::Error {
            message: "connection refused".to_string(),
        };
        let encoded = serde_json::to_string(&reply).unwrap();
        assert_eq!(
            encoded,
            r#"{"status":"error","message":"connection refused"}"#
        );
    }
}
