//! Shared types for the secure enclave egress tunnel pipeline: wire
//! envelopes, length-prefixed framing, configuration, the error
//! taxonomy, the vsock/TCP transport abstraction, an attestation stub,
//! and metrics registration. Consumed by the `htr`, `hip`, and `es`
//! binaries.

pub mod attestation;
pub mod config;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod logging;
pub mod metrics;
pub mod transport;
pub mod tunnel;

pub use config::Config;
pub use error::TunnelError;
