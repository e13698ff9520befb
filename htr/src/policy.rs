//! Optional RFC 1918 rejection hook, disabled by default. HTR is meant to
//! relay opaque bytes without inspecting them; this predicate only looks
//! at the connect target's resolved address, never at tunnel payload.

use std::net::IpAddr;

pub async fn is_blocked_target(host: &str) -> bool {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_blocked_ip(ip);
    }
    match tokio::net::lookup_host((host, 0)).await {
        Ok(addrs) => addrs.map(|addr| addr.ip()).any(is_blocked_ip),
        Err(_) => false,
    }
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_loopback_and_private_literals() {
        assert!(is_blocked_target("127.0.0.1").await);
        assert!(is_blocked_target("10.0.0.5").await);
        assert!(is_blocked_target("192.168.1.1").await);
    }

    #[tokio::test]
    async fn allows_public_literal() {
        assert!(!is_blocked_target("93.184.216.34").await);
    }
}
