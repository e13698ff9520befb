//! Error taxonomy shared by every component of the tunnel pipeline.
//!
//! A single enum carries both the HTTP status a failure should surface as
//! and the retry policy attached to it, so HIP and ES never have to agree
//! on a second, parallel classification.

use thiserror::Error;

use crate::envelope::ControlResponse;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("tunnel failed: {0}")]
    TunnelFailed(String),

    #[error("tls handshake failed: {0}")]
    TlsHandshakeFailed(String),

    #[error("upstream io error: {0}")]
    UpstreamIoError(String),

    #[error("response malformed: {0}")]
    ResponseMalformed(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("enclave unavailable: {0}")]
    EnclaveUnavailable(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl TunnelError {
    /// HTTP status code HIP should answer the client with.
    pub fn status(&self) -> u16 {
        match self {
            TunnelError::BadRequest(_) => 400,
            TunnelError::TunnelFailed(_) => 503,
            TunnelError::TlsHandshakeFailed(_) => 502,
            TunnelError::UpstreamIoError(_) => 502,
            TunnelError::ResponseMalformed(_) => 502,
            TunnelError::Timeout(_) => 504,
            TunnelError::EnclaveUnavailable(_) => 503,
            TunnelError::InternalError(_) => 500,
        }
    }

    /// Whether HIP's retry policy should re-send the request on this
    /// failure. ES never retries internally — see spec §7.
    pub fn hip_may_retry(&self) -> bool {
        matches!(
            self,
            TunnelError::TunnelFailed(_) | TunnelError::EnclaveUnavailable(_) | TunnelError::Timeout(_)
        )
    }

    pub fn into_control_response(self) -> ControlResponse {
        ControlResponse::failure(self.status(), self.to_string())
    }
}
