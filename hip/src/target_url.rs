//! Reconstructs the absolute URL a proxied request targets, from either
//! an absolute request-target or an `X-Target-URL` header — the same
//! mechanism the demo client drives via `proxy_headers['X-Target-URL']`.
//! Scheme validation (HTTPS-only) is ES's job, not HIP's: HIP forwards
//! whatever absolute target it can resolve and lets the enclave's own
//! request validation reject it, so the failure comes back through the
//! normal Failure-envelope path instead of a local short-circuit.

use axum::http::{HeaderMap, Uri};

use tunnel_core::error::TunnelError;

pub fn resolve(uri: &Uri, headers: &HeaderMap) -> Result<String, TunnelError> {
    if uri.scheme().is_some() {
        return Ok(uri.to_string());
    }

    if let Some(value) = headers.get("x-target-url") {
        let raw = value
            .to_str()
            .map_err(|_| TunnelError::BadRequest("X-Target-URL header is not valid UTF-8".to_string()))?;
        return Ok(raw.to_string());
    }

    Err(TunnelError::BadRequest(
        "request has no absolute target: use an absolute request-target or an X-Target-URL header".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn rejects_request_with_no_target() {
        let uri: Uri = "/widgets".parse().unwrap();
        let headers = HeaderMap::new();
        assert!(resolve(&uri, &headers).is_err());
    }

    #[test]
    fn accepts_absolute_request_target() {
        let uri: Uri = "https://example.com/widgets".parse().unwrap();
        let headers = HeaderMap::new();
        assert_eq!(resolve(&uri, &headers).unwrap(), "https://example.com/widgets");
    }

    #[test]
    fn accepts_x_target_url_header() {
        let uri: Uri = "/widgets".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-target-url", HeaderValue::from_static("https://example.com/widgets"));
        assert_eq!(resolve(&uri, &headers).unwrap(), "https://example.com/widgets");
    }

    #[test]
    fn passes_through_plaintext_http_target_for_es_to_reject() {
        let uri: Uri = "/widgets".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-target-url", HeaderValue::from_static("http://example.com/widgets"));
        assert_eq!(resolve(&uri, &headers).unwrap(), "http://example.com/widgets");
    }
}
