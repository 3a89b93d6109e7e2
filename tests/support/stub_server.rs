//! Raw TCP HTTP stub for behavior wiremock cannot produce: dropped
//! connections, truncated or stalled bodies, and in-flight request counting.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::socket_guard::should_skip_socket_bound_test;

/// What the stub does with each connection.
#[derive(Debug, Clone, Default)]
pub struct StubConfig {
    /// Close this many connections right after reading the request.
    pub drop_first: usize,
    /// Delay before responding (per request).
    pub delay: Duration,
    /// Response body; `Content-Length` always announces its full length.
    pub body: Vec<u8>,
    /// Send only this many body bytes, then close.
    pub truncate_at: Option<usize>,
    /// Send only this many body bytes, then hang without closing.
    pub stall_at: Option<usize>,
}

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A running stub; aborted on drop.
pub struct StubServer {
    addr: SocketAddr,
    counters: Arc<Counters>,
    handle: JoinHandle<()>,
}

impl StubServer {
    /// Starts the stub, or returns `None` if localhost cannot be bound.
    pub async fn start(config: StubConfig) -> Option<Self> {
        if should_skip_socket_bound_test() {
            return None;
        }
        let listener = TcpListener::bind("127.0.0.1:0").await.ok()?;
        let addr = listener.local_addr().ok()?;
        let counters = Arc::new(Counters::default());
        let config = Arc::new(config);

        let accept_counters = Arc::clone(&counters);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = accept_counters.connections.fetch_add(1, Ordering::SeqCst);
                let counters = Arc::clone(&accept_counters);
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_connection(stream, index, &config, &counters).await;
                });
            }
        });

        Some(Self {
            addr,
            counters,
            handle,
        })
    }

    /// URL for `path` on this stub.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.counters.connections.load(Ordering::SeqCst)
    }

    /// Highest number of requests being served at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    index: usize,
    config: &StubConfig,
    counters: &Counters,
) {
    if read_request_head(&mut stream).await.is_none() {
        return;
    }
    if index < config.drop_first {
        drop(stream);
        return;
    }

    let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

    if !config.delay.is_zero() {
        tokio::time::sleep(config.delay).await;
    }

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        config.body.len()
    );
    let cut = config
        .truncate_at
        .or(config.stall_at)
        .unwrap_or(config.body.len())
        .min(config.body.len());

    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(&config.body[..cut]).await;
    let _ = stream.flush().await;

    counters.in_flight.fetch_sub(1, Ordering::SeqCst);

    if config.stall_at.is_some() {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
    let _ = stream.shutdown().await;
}

/// Reads until the blank line ending the request head.
async fn read_request_head(stream: &mut TcpStream) -> Option<()> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            return Some(());
        }
    }
}
