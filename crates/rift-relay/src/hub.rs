//! Relay hub: the shared pairing index plus the per-opcode rules for
//! conduit and peer traffic.
//!
//! The index lock is only held around index mutations. Frames are queued
//! on the target's `Link` after the guard is dropped.

use std::sync::Arc;

use rift_common::{
    ConduitFrame, ConnId, PeerFrame, ServerToConduit, ServerToPeer, WireFrame,
};
use tokio::sync::RwLock;

use crate::error::{RelayError, Result};
use crate::link::Link;
use crate::pairing::{Evicted, PairError, PairingIndex};

/// Thread-safe relay state shared by every connection task.
#[derive(Clone, Default)]
pub struct RelayHub {
    index: Arc<RwLock<PairingIndex>>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the `userId` a conduit presented on upgrade.
    pub fn validate_conduit_user(user_id: Option<&str>) -> Result<String> {
        match user_id.map(str::trim) {
            None => Err(RelayError::HandshakeRejected("missing userId")),
            Some("") => Err(RelayError::HandshakeRejected("empty userId")),
            Some(id) => Ok(id.to_string()),
        }
    }

    /// Register a conduit, closing whichever conduit it replaces.
    pub async fn accept_conduit(&self, user_id: &str, link: Link) {
        let evicted = self.index.write().await.register_conduit(user_id, link);
        tracing::info!(user = %user_id, "Conduit registered");
        if let Some(evicted) = evicted {
            tracing::info!(user = %user_id, old = %evicted.conduit.id(), "Replacing previous conduit");
            close_evicted(evicted);
        }
    }

    /// Track a new mobile socket. Peers need no handshake to be accepted.
    pub async fn accept_peer(&self, link: Link) {
        tracing::info!(conn = %link.id(), "Got a new mobile connection");
        self.index.write().await.add_peer(link);
    }

    /// Apply one text frame from a conduit. An `Err` means the conduit
    /// must be closed.
    pub async fn on_conduit_frame(&self, conduit: &Link, text: &str) -> Result<()> {
        match ConduitFrame::decode(text)? {
            ConduitFrame::Reply {
                pairing: Some(pairing),
                payload,
            } => {
                let peer = self
                    .index
                    .read()
                    .await
                    .find_peer(conduit.id(), &pairing)
                    .cloned();
                match peer {
                    Some(peer) => {
                        tracing::debug!(pairing = %pairing, "Forwarding conduit reply to mobile");
                        peer.send(&ServerToPeer::Receive(payload));
                    }
                    None => {
                        tracing::info!(pairing = %pairing, "Conduit reply for unknown peer, ignoring");
                    }
                }
                Ok(())
            }
            ConduitFrame::Reply { pairing: None, .. } => {
                tracing::info!(conn = %conduit.id(), "Conduit reply without a pairing id, ignoring");
                Ok(())
            }
        }
    }

    /// Apply one text frame from a peer. An `Err` means the peer must be
    /// closed.
    pub async fn on_peer_frame(&self, peer: &Link, text: &str) -> Result<()> {
        match PeerFrame::decode(text)? {
            PeerFrame::Connect { user_id } => self.connect_peer(peer, &user_id).await,
            PeerFrame::Send { payload } => {
                let pairing = self.index.read().await.pairing_of(peer.id()).cloned();
                let Some(pairing) = pairing else {
                    return Err(RelayError::UnpairedSend);
                };
                pairing.conduit.send(&ServerToConduit::Message {
                    pairing: pairing.pairing,
                    payload,
                });
                Ok(())
            }
        }
    }

    async fn connect_peer(&self, peer: &Link, user_id: &str) -> Result<()> {
        let result = self.index.write().await.pair(peer.id(), user_id);
        match result {
            Ok(pairing) => {
                tracing::info!(user = %user_id, pairing = %pairing.pairing, "Mobile paired with conduit");
                pairing.conduit.send(&ServerToConduit::Open(pairing.pairing));
                peer.send(&ServerToPeer::ConnectResult(true));
                Ok(())
            }
            Err(PairError::Unreachable) => {
                tracing::info!(user = %user_id, "Mobile tried to connect to offline user");
                peer.send(&ServerToPeer::ConnectResult(false));
                Ok(())
            }
            Err(PairError::AlreadyPaired) => Err(RelayError::ProtocolViolation(
                "connect on an already paired socket".into(),
            )),
            Err(PairError::UnknownPeer) => Err(RelayError::ProtocolViolation(
                "connect from an unregistered socket".into(),
            )),
        }
    }

    /// Conduit socket `id` is gone: close its peers and drop its registration.
    pub async fn conduit_closed(&self, id: ConnId) {
        let evicted = self.index.write().await.remove_conduit(id);
        if let Some(evicted) = evicted {
            tracing::info!(user = %evicted.user_id, peers = evicted.peers.len(), "Conduit disconnected");
            close_evicted(evicted);
        }
    }

    /// Peer socket `id` is gone: unpair it and tell its conduit.
    pub async fn peer_closed(&self, id: ConnId) {
        let pairing = self.index.write().await.remove_peer(id);
        if let Some(pairing) = pairing {
            tracing::info!(pairing = %pairing.pairing, "Paired mobile closed");
            if pairing.conduit.is_open() {
                pairing.conduit.send(&ServerToConduit::Close(pairing.pairing));
            }
        }
    }

    /// Ping every socket in both pools. No pong deadline is enforced.
    pub async fn ping_all(&self) -> usize {
        let links = self.index.read().await.links();
        links.iter().filter(|l| l.is_open() && l.ping()).count()
    }

    pub async fn is_user_online(&self, user_id: &str) -> bool {
        self.index.read().await.is_online(user_id)
    }

    pub async fn online_users(&self) -> Vec<String> {
        self.index.read().await.online_users()
    }

    pub async fn peer_count(&self, user_id: &str) -> usize {
        self.index.read().await.peer_count(user_id)
    }
}

/// Tell each peer its pairing is over, close it, then close the conduit.
fn close_evicted(evicted: Evicted) {
    for peer in &evicted.peers {
        peer.link.send(&ServerToPeer::Close(peer.pairing.clone()));
        peer.link.close();
    }
    evicted.conduit.close();
}
