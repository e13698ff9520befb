//! Stub standing in for the platform's Nitro attestation API. The real
//! document format and PCR semantics are an external collaborator this
//! workspace does not define; this produces a shape compatible with the
//! `{attestation_doc, pcrs, timestamp, nonce}` record the enclave boot
//! process is expected to emit.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationDocument {
    pub attestation_doc: String,
    pub pcrs: BTreeMap<String, String>,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

pub fn generate_attestation(nonce: Option<&[u8]>) -> AttestationDocument {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut pcrs = BTreeMap::new();
    pcrs.insert("0".to_string(), "stub-pcr0".to_string());
    pcrs.insert("1".to_string(), "stub-pcr1".to_string());
    pcrs.insert("2".to_string(), "stub-pcr2".to_string());

    AttestationDocument {
        attestation_doc: "stub-attestation-document".to_string(),
        pcrs,
        timestamp,
        nonce: nonce.map(hex::encode),
    }
}
