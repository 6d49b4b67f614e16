//! Handle to one accepted socket.
//!
//! The connection task owns the WebSocket; everyone else talks to it
//! through a `Link`. Writes are queued on a bounded channel and dropped,
//! never awaited, when the socket is gone or the queue is full.

use std::sync::Arc;

use rift_common::{ConnId, WireFrame};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

/// Per-connection outbound queue depth.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Work for the connection task's write half.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Ping,
}

#[derive(Debug, Clone)]
pub struct Link {
    id: ConnId,
    tx: mpsc::Sender<Outbound>,
    closer: Arc<Notify>,
}

impl Link {
    /// Create a link and the receiving ends its connection task drives.
    pub fn new() -> (Self, mpsc::Receiver<Outbound>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let closer = Arc::new(Notify::new());
        let link = Self {
            id: ConnId::next(),
            tx,
            closer: Arc::clone(&closer),
        };
        (link, rx, closer)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// False once the connection task has exited.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a protocol frame. Returns whether it was queued.
    pub fn send<F: WireFrame>(&self, frame: &F) -> bool {
        self.push(Outbound::Text(frame.encode()))
    }

    pub fn ping(&self) -> bool {
        self.push(Outbound::Ping)
    }

    /// Ask the connection task to close the socket once queued frames
    /// have been written.
    pub fn close(&self) {
        self.closer.notify_one();
    }

    fn push(&self, msg: Outbound) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn = %self.id, "Outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(conn = %self.id, "Socket already closed, dropping frame");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rift_common::ServerToPeer;

    #[tokio::test]
    async fn send_queues_encoded_frame() {
        let (link, mut rx, _closer) = Link::new();
        assert!(link.send(&ServerToPeer::ConnectResult(false)));
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Text(r#"["connect-result",false]"#.into()))
        );
    }

    #[tokio::test]
    async fn sends_are_dropped_after_receiver_is_gone() {
        let (link, rx, _closer) = Link::new();
        assert!(link.is_open());
        drop(rx);
        assert!(!link.is_open());
        assert!(!link.ping());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (link, _rx, _closer) = Link::new();
        for _ in 0..OUTBOUND_CAPACITY {
            assert!(link.ping());
        }
        assert!(!link.ping());
    }

    #[tokio::test]
    async fn close_is_remembered_until_observed() {
        let (link, _rx, closer) = Link::new();
        link.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), closer.notified())
            .await
            .unwrap();
    }

    #[test]
    fn links_have_distinct_ids() {
        let (a, _ra, _ca) = Link::new();
        let (b, _rb, _cb) = Link::new();
        assert_ne!(a.id(), b.id());
    }
}
