//! Transport abstraction letting every component run against either a
//! real vsock socket or a loopback TCP socket behind one
//! `AsyncRead`/`AsyncWrite` surface.

use std::net::SocketAddr;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_vsock::{VsockAddr, VsockListener, VsockStream, VMADDR_CID_ANY};

pub trait DuplexStream: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> DuplexStream for T {}

pub type BoxedStream = Pin<Box<dyn DuplexStream>>;

/// A connect-or-listen target. `Vsock` is what production binaries use;
/// `Tcp` stands in for it in tests and local development, where no vsock
/// device is available.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Vsock { cid: u32, port: u32 },
    Tcp(SocketAddr),
}

impl Endpoint {
    pub async fn connect(&self) -> std::io::Result<BoxedStream> {
        match self {
            Endpoint::Vsock { cid, port } => {
                let stream = VsockStream::connect(VsockAddr::new(*cid, *port)).await?;
                Ok(Box::pin(stream))
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                Ok(Box::pin(stream))
            }
        }
    }

    pub async fn listen(&self) -> std::io::Result<BoundListener> {
        match self {
            Endpoint::Vsock { port, .. } => {
                let listener = VsockListener::bind(VsockAddr::new(VMADDR_CID_ANY, *port))?;
                Ok(BoundListener::Vsock(listener))
            }
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await?;
                Ok(BoundListener::Tcp(listener))
            }
        }
    }
}

pub enum BoundListener {
    Vsock(VsockListener),
    Tcp(TcpListener),
}

impl BoundListener {
    pub async fn accept(&self) -> std::io::Result<BoxedStream> {
        match self {
            BoundListener::Vsock(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Box::pin(stream))
            }
            BoundListener::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Box::pin(stream))
            }
        }
    }

    /// The address actually bound, useful in tests that bind to port 0.
    pub fn local_addr(&self) -> std::io::Result<Option<SocketAddr>> {
        match self {
            BoundListener::Vsock(_) => Ok(None),
            BoundListener::Tcp(listener) => listener.local_addr().map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn tcp_endpoint_round_trips_bytes() {
        let listener = Endpoint::Tcp("127.0.0.1:0".parse().unwrap())
            .listen()
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().unwrap();

        let server = tokio::spawn(async move {
            let mut stream = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let mut client = Endpoint::Tcp(addr).connect().await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut echoed = [0u8; 5];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"hello");

        server.await.unwrap();
    }
}
