//! Control-channel request/response envelopes (HIP <-> ES).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type HeaderMap = IndexMap<String, String>;

/// What HIP sends ES: everything ES needs to originate the request itself.
/// No connection, socket, or TLS state crosses this boundary, only data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: Option<String>,
}

/// ES's reply. Untagged because the wire shape is exactly the Python
/// original's: `{success, status, headers, body}` or `{success, status,
/// error}`, distinguished by which of `body`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Success {
        success: bool,
        status: u16,
        #[serde(default)]
        headers: HeaderMap,
        body: String,
    },
    Failure {
        success: bool,
        status: u16,
        error: String,
    },
}

impl ControlResponse {
    pub fn success(status: u16, headers: HeaderMap, body: String) -> Self {
        ControlResponse::Success {
            success: true,
            status,
            headers,
            body,
        }
    }

    pub fn failure(status: u16, error: String) -> Self {
        ControlResponse::Failure {
            success: false,
            status,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ControlResponse::Success { .. })
    }
}
