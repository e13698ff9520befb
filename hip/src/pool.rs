//! Bounded LIFO pool of control-channel connections to the enclave
//! sidecar. Checkout pops from the end of the stack (most recently
//! returned connection first, so a hot connection stays hot); a
//! background reaper evicts connections that have sat idle too long.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use tunnel_core::transport::{BoxedStream, Endpoint};

struct PooledConn {
    stream: BoxedStream,
    last_used: Instant,
}

pub struct ConnectionPool {
    target: Endpoint,
    max_size: usize,
    idle_timeout: Duration,
    idle: Mutex<Vec<PooledConn>>,
}

impl ConnectionPool {
    pub fn new(target: Endpoint, max_size: usize, idle_timeout: Duration) -> Self {
        ConnectionPool {
            target,
            max_size,
            idle_timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Checks out a connection, reusing the most recently returned one if
    /// any are idle, otherwise dialing a fresh one.
    pub async fn checkout(&self) -> std::io::Result<BoxedStream> {
        if let Some(conn) = self.idle.lock().await.pop() {
            debug!("reusing pooled control connection");
            return Ok(conn.stream);
        }
        debug!("dialing new control connection");
        self.target.connect().await
    }

    /// Returns a still-healthy connection to the pool. Connections that
    /// errored during use should be dropped instead of returned here.
    pub async fn checkin(&self, stream: BoxedStream) {
        let mut idle = self.idle.lock().await;
        if idle.len() >= self.max_size {
            debug!("pool at capacity, closing returned connection");
            return;
        }
        idle.push(PooledConn {
            stream,
            last_used: Instant::now(),
        });
    }

    async fn reap_once(&self) {
        let mut idle = self.idle.lock().await;
        let before = idle.len();
        idle.retain(|conn| conn.last_used.elapsed() < self.idle_timeout);
        let reaped = before - idle.len();
        if reaped > 0 {
            debug!(reaped, "evicted idle control connections");
        }
    }

    pub fn spawn_reaper(self: Arc<Self>) {
        let sweep_interval = self.idle_timeout.min(Duration::from_secs(10)).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                self.reap_once().await;
            }
        });
    }
}
