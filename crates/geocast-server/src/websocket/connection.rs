//! Per-connection state shared between the session loop and the broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use geocast_core::ConnectionId;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::metrics::TOPIC_DROPS_TOTAL;
use crate::stomp::Frame;

/// A connected WebSocket client.
pub struct ClientConnection {
    /// Server-assigned connection id.
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    /// When the socket was accepted.
    pub connected_at: Instant,
    stomp_connected: AtomicBool,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Wrap the sending half of the connection's outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            stomp_connected: AtomicBool::new(false),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue already-encoded text. Never waits.
    ///
    /// Returns `false` and counts a drop when the queue is full or closed.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            counter!(TOPIC_DROPS_TOTAL).increment(1);
            false
        }
    }

    /// Encode and queue a STOMP frame.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.send(Arc::new(frame.encode()))
    }

    /// Messages dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether the client has completed the STOMP CONNECT handshake.
    pub fn is_stomp_connected(&self) -> bool {
        self.stomp_connected.load(Ordering::Acquire)
    }

    /// Record a completed handshake. Returns `false` if it was already done.
    pub fn mark_stomp_connected(&self) -> bool {
        !self.stomp_connected.swap(true, Ordering::AcqRel)
    }

    /// Record inbound activity (pong or any frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Read and reset the alive flag. `true` if there was activity since the
    /// previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stomp::Command;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ClientConnection::new(ConnectionId::new(), tx), rx)
    }

    #[tokio::test]
    async fn send_frame_encodes() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send_frame(&Frame::receipt("r1")));
        let text = rx.recv().await.unwrap();
        assert!(text.starts_with("RECEIPT\n"));
        assert_eq!(crate::stomp::decode(text.as_bytes()).unwrap()[0].command, Command::Receipt);
    }

    #[tokio::test]
    async fn full_queue_counts_drops() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("a".into())));
        assert!(!conn.send(Arc::new("b".into())));
        assert!(!conn.send(Arc::new("c".into())));
        assert_eq!(conn.drop_count(), 2);
    }

    #[test]
    fn closed_queue_counts_drops() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert!(!conn.send(Arc::new("x".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn stomp_handshake_happens_once() {
        let (conn, _rx) = make_connection(1);
        assert!(!conn.is_stomp_connected());
        assert!(conn.mark_stomp_connected());
        assert!(!conn.mark_stomp_connected());
        assert!(conn.is_stomp_connected());
    }

    #[test]
    fn alive_flag_resets_on_check() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
        assert!(conn.last_pong_elapsed() < Duration::from_secs(1));
    }
}
