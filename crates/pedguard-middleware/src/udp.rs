//! UDP transport.
//!
//! [`UdpTelemetrySource`] listens for telemetry datagrams and implements the
//! latest-wins drain: after a bounded wait for readability, every datagram
//! already queued (up to `max_drain`) is read without blocking and only the
//! newest is kept.  [`UdpCommandSink`] serialises [`CommandPayload`]s to
//! compact JSON and sends each as one datagram to the vehicle endpoint.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use pedguard_types::{CommandPayload, GuardError};
use tokio::net::{UdpSocket, lookup_host};
use tracing::{debug, warn};

use crate::adapter::{CommandSink, Drained, TelemetrySource};

/// Receive buffer size; longer datagrams are truncated and fail to decode.
pub const RECV_BUFFER_BYTES: usize = 2048;

fn transport(endpoint: impl Into<String>, details: impl ToString) -> GuardError {
    GuardError::Transport {
        endpoint: endpoint.into(),
        details: details.to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound
// ────────────────────────────────────────────────────────────────────────────

/// Telemetry listener bound to the controller's receive address.
pub struct UdpTelemetrySource {
    socket: UdpSocket,
    max_drain: usize,
    buf: Vec<u8>,
}

impl UdpTelemetrySource {
    /// Bind to `addr` (e.g. `"0.0.0.0:9000"`).
    ///
    /// `max_drain` bounds how many queued datagrams one poll may consume; it
    /// is clamped to at least one.
    pub async fn bind(addr: &str, max_drain: usize) -> Result<Self, GuardError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| transport(addr, e))?;
        debug!(addr, max_drain, "telemetry socket bound");
        Ok(Self {
            socket,
            max_drain: max_drain.max(1),
            buf: vec![0u8; RECV_BUFFER_BYTES],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GuardError> {
        self.socket
            .local_addr()
            .map_err(|e| transport("telemetry socket", e))
    }
}

#[async_trait]
impl TelemetrySource for UdpTelemetrySource {
    async fn poll_latest(&mut self, max_wait: Duration) -> Option<Drained> {
        match tokio::time::timeout(max_wait, self.socket.readable()).await {
            Err(_elapsed) => return None,
            Ok(Err(e)) => {
                warn!(error = %e, "telemetry socket not readable");
                return None;
            }
            Ok(Ok(())) => {}
        }

        let mut latest: Option<Vec<u8>> = None;
        let mut received = 0usize;
        while received < self.max_drain {
            match self.socket.try_recv_from(&mut self.buf) {
                Ok((len, _peer)) => {
                    received += 1;
                    latest = Some(self.buf[..len].to_vec());
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "telemetry receive failed");
                    break;
                }
            }
        }

        latest.map(|latest| Drained { latest, received })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound
// ────────────────────────────────────────────────────────────────────────────

/// Command sender aimed at the vehicle endpoint.
pub struct UdpCommandSink {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpCommandSink {
    /// Resolve `peer` (e.g. `"192.168.1.25:9001"`) and open an ephemeral
    /// socket of the matching address family.
    pub async fn connect(peer: &str) -> Result<Self, GuardError> {
        let resolved = lookup_host(peer)
            .await
            .map_err(|e| transport(peer, e))?
            .next()
            .ok_or_else(|| transport(peer, "address did not resolve"))?;
        let local = if resolved.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| transport(peer, e))?;
        Ok(Self {
            socket,
            peer: resolved,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl CommandSink for UdpCommandSink {
    async fn send(&mut self, payload: &CommandPayload) -> Result<(), GuardError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| transport(self.endpoint(), e))?;
        self.socket
            .send_to(&bytes, self.peer)
            .await
            .map_err(|e| transport(self.endpoint(), e))?;
        Ok(())
    }

    fn endpoint(&self) -> String {
        self.peer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_pair() -> (UdpTelemetrySource, UdpSocket, SocketAddr) {
        let source = UdpTelemetrySource::bind("127.0.0.1:0", 1024).await.unwrap();
        let addr = source.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (source, sender, addr)
    }

    #[tokio::test]
    async fn poll_times_out_when_idle() {
        let (mut source, _sender, _addr) = loopback_pair().await;
        let started = std::time::Instant::now();
        let polled = source.poll_latest(Duration::from_millis(30)).await;
        assert!(polled.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn backlog_collapses_to_latest() {
        let (mut source, sender, addr) = loopback_pair().await;
        for i in 0..5 {
            let msg = format!(r#"{{"seq":{i}}}"#);
            sender.send_to(msg.as_bytes(), addr).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let drained = source.poll_latest(Duration::from_millis(500)).await.unwrap();
        assert_eq!(drained.received, 5);
        assert_eq!(drained.discarded(), 4);
        assert_eq!(drained.latest, br#"{"seq":4}"#.to_vec());
    }

    #[tokio::test]
    async fn drain_is_bounded() {
        let mut source = UdpTelemetrySource::bind("127.0.0.1:0", 2).await.unwrap();
        let addr = source.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for i in 0..3 {
            sender.send_to(format!("{i}").as_bytes(), addr).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let first = source.poll_latest(Duration::from_millis(500)).await.unwrap();
        assert_eq!(first.received, 2);
        assert_eq!(first.latest, b"1".to_vec());
        let second = source.poll_latest(Duration::from_millis(500)).await.unwrap();
        assert_eq!(second.received, 1);
        assert_eq!(second.latest, b"2".to_vec());
    }

    #[tokio::test]
    async fn sink_sends_compact_json() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = receiver.local_addr().unwrap();
        let mut sink = UdpCommandSink::connect(&peer.to_string()).await.unwrap();
        assert_eq!(sink.endpoint(), peer.to_string());

        sink.send(&CommandPayload::slowdown(7.456)).await.unwrap();
        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], br#"{"cmd":"slowdown","distance":7.46}"#);
    }

    #[tokio::test]
    async fn unresolvable_peer_is_transport_error() {
        let err = UdpCommandSink::connect("not an address").await;
        assert!(matches!(err, Err(GuardError::Transport { .. })));
    }
}
