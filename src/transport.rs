//! Outbound datagram transport.
//!
//! Fire-and-forget UDP: one `send_to` per message, no connection, no
//! acknowledgement. A successful send means the datagram was handed to the
//! kernel, not that PolyNodes received it.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, error, info};

use crate::error::TransportError;

/// Something that can carry one encoded OSC packet to the synth.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `payload` as a single datagram. Returns the number of bytes sent.
    async fn send(&self, payload: &[u8]) -> Result<usize, TransportError>;

    /// Where datagrams go.
    fn destination(&self) -> SocketAddr;

    /// Snapshot of the counters since the transport was created.
    fn stats(&self) -> TransportStats;
}

/// Counters kept by [`UdpTransport`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub errors: u64,
    #[serde(skip)]
    pub last_activity: Option<Instant>,
}

impl TransportStats {
    /// Time since the last send attempt, if there was one.
    pub fn idle(&self) -> Option<Duration> {
        self.last_activity.map(|at| at.elapsed())
    }
}

pub struct UdpTransport {
    socket: UdpSocket,
    destination: SocketAddr,
    stats: Mutex<TransportStats>,
}

impl UdpTransport {
    /// Bind a local socket and target `destination`. The socket stays
    /// unconnected so an unreachable destination never poisons later sends.
    pub async fn bind(bind: SocketAddr, destination: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(bind).await.map_err(|e| TransportError::Bind {
            address: bind.to_string(),
            message: e.to_string(),
        })?;
        let local = socket.local_addr().map_or_else(|_| bind.to_string(), |a| a.to_string());
        info!(local = %local, destination = %destination, "UDP transport ready");
        Ok(Self {
            socket,
            destination,
            stats: Mutex::new(TransportStats::default()),
        })
    }

    fn record_error(&self) {
        let mut stats = self.stats.lock();
        stats.errors += 1;
        stats.last_activity = Some(Instant::now());
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, payload: &[u8]) -> Result<usize, TransportError> {
        let sent = match self.socket.send_to(payload, self.destination).await {
            Ok(sent) => sent,
            Err(e) => {
                self.record_error();
                error!(destination = %self.destination, error = %e, "UDP send failed");
                return Err(TransportError::Send {
                    destination: self.destination,
                    message: e.to_string(),
                });
            }
        };
        if sent != payload.len() {
            self.record_error();
            let expected = payload.len();
            error!(destination = %self.destination, sent, expected, "short UDP send");
            return Err(TransportError::ShortSend {
                destination: self.destination,
                sent,
                expected: payload.len(),
            });
        }

        let mut stats = self.stats.lock();
        stats.packets_sent += 1;
        stats.bytes_sent += sent as u64;
        stats.last_activity = Some(Instant::now());
        drop(stats);

        debug!(destination = %self.destination, bytes = sent, "sent UDP datagram");
        Ok(sent)
    }

    fn destination(&self) -> SocketAddr {
        self.destination
    }

    fn stats(&self) -> TransportStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[tokio::test]
    async fn delivers_one_datagram_per_send() {
        let (rx, addr) = receiver().await;
        let tx = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), addr)
            .await
            .unwrap();

        assert_eq!(tx.send(b"/a\0\0,\0\0\0").await.unwrap(), 8);
        assert_eq!(tx.send(b"/b\0\0,\0\0\0").await.unwrap(), 8);

        let mut buf = [0u8; 64];
        for expected in [b"/a", b"/b"] {
            let (n, _) = tokio::time::timeout(Duration::from_secs(2), rx.recv_from(&mut buf))
                .await
                .expect("datagram should arrive")
                .unwrap();
            assert_eq!(n, 8);
            assert_eq!(&buf[..2], expected);
        }

        let stats = tx.stats();
        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.bytes_sent, 16);
        assert_eq!(stats.errors, 0);
        assert!(stats.idle().is_some());
    }

    #[tokio::test]
    async fn fresh_transport_has_no_activity() {
        let (_rx, addr) = receiver().await;
        let tx = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), addr)
            .await
            .unwrap();
        let stats = tx.stats();
        assert_eq!(stats.packets_sent, 0);
        assert!(stats.idle().is_none());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let (_held, addr) = receiver().await;
        let err = UdpTransport::bind(addr, addr).await.err().expect("port is taken");
        assert!(matches!(err, TransportError::Bind { .. }));
    }

    #[tokio::test]
    async fn oversized_datagram_is_a_send_error() {
        let (_rx, addr) = receiver().await;
        let tx = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), addr)
            .await
            .unwrap();
        let payload = vec![0u8; 70_000];
        assert!(tx.send(&payload).await.is_err());
        assert_eq!(tx.stats().errors, 1);
    }
}
