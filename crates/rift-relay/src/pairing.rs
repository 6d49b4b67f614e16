//! Bidirectional pairing index: conduits by user, peers by socket, and the
//! pairings between them.
//!
//! Both directions of every pairing live in this one structure and are
//! only changed through its methods, so a peer can never be listed under a
//! conduit without pointing back at it (and vice versa).

use std::collections::HashMap;

use rift_common::{ConnId, PairingId};

use crate::link::Link;

/// A peer as seen from its conduit.
#[derive(Debug, Clone)]
pub struct PairedPeer {
    pub pairing: PairingId,
    pub link: Link,
}

/// A conduit as seen from one of its peers.
#[derive(Debug, Clone)]
pub struct Pairing {
    pub pairing: PairingId,
    pub conduit: Link,
}

/// Why a `connect` could not be honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairError {
    /// Peer socket is not registered (already closed).
    UnknownPeer,
    /// Peer already has a pairing.
    AlreadyPaired,
    /// No live conduit for the requested user.
    Unreachable,
}

/// A conduit slot that was taken over or removed, with the peers that
/// were paired to it. Those peers are already unpaired in the index.
#[derive(Debug)]
pub struct Evicted {
    pub user_id: String,
    pub conduit: Link,
    pub peers: Vec<PairedPeer>,
}

struct ConduitSlot {
    link: Link,
    peers: Vec<PairedPeer>,
}

struct PeerSlot {
    link: Link,
    pairing: Option<Pairing>,
}

#[derive(Default)]
pub struct PairingIndex {
    conduits: HashMap<String, ConduitSlot>,
    owners: HashMap<ConnId, String>,
    peers: HashMap<ConnId, PeerSlot>,
}

impl PairingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `link` as the conduit for `user_id`. A conduit already
    /// registered for that user is returned so the caller can close it.
    pub fn register_conduit(&mut self, user_id: &str, link: Link) -> Option<Evicted> {
        let previous = self.evict_user(user_id);
        self.owners.insert(link.id(), user_id.to_string());
        self.conduits.insert(
            user_id.to_string(),
            ConduitSlot {
                link,
                peers: Vec::new(),
            },
        );
        previous
    }

    /// Drop the registration owned by conduit socket `id`. A socket that was
    /// already replaced by a newer registration owns nothing and yields `None`.
    pub fn remove_conduit(&mut self, id: ConnId) -> Option<Evicted> {
        let user_id = self.owners.get(&id)?.clone();
        self.evict_user(&user_id)
    }

    fn evict_user(&mut self, user_id: &str) -> Option<Evicted> {
        let slot = self.conduits.remove(user_id)?;
        self.owners.remove(&slot.link.id());
        for peer in &slot.peers {
            if let Some(p) = self.peers.get_mut(&peer.link.id()) {
                p.pairing = None;
            }
        }
        Some(Evicted {
            user_id: user_id.to_string(),
            conduit: slot.link,
            peers: slot.peers,
        })
    }

    /// Track a freshly accepted, unpaired peer socket.
    pub fn add_peer(&mut self, link: Link) {
        self.peers.insert(
            link.id(),
            PeerSlot {
                link,
                pairing: None,
            },
        );
    }

    /// Pair peer `peer` with the conduit registered for `user_id` under a
    /// freshly minted id.
    pub fn pair(&mut self, peer: ConnId, user_id: &str) -> Result<Pairing, PairError> {
        let peer_slot = self.peers.get_mut(&peer).ok_or(PairError::UnknownPeer)?;
        if peer_slot.pairing.is_some() {
            return Err(PairError::AlreadyPaired);
        }
        let conduit = self
            .conduits
            .get_mut(user_id)
            .ok_or(PairError::Unreachable)?;

        let mut pairing = PairingId::new();
        while conduit.peers.iter().any(|p| p.pairing == pairing) {
            pairing = PairingId::new();
        }

        conduit.peers.push(PairedPeer {
            pairing: pairing.clone(),
            link: peer_slot.link.clone(),
        });
        let entry = Pairing {
            pairing,
            conduit: conduit.link.clone(),
        };
        peer_slot.pairing = Some(entry.clone());
        Ok(entry)
    }

    /// The pairing of peer `peer`, if any.
    pub fn pairing_of(&self, peer: ConnId) -> Option<&Pairing> {
        self.peers.get(&peer)?.pairing.as_ref()
    }

    /// Look up a peer by pairing id within the conduit socket `conduit`.
    pub fn find_peer(&self, conduit: ConnId, pairing: &PairingId) -> Option<&Link> {
        let user_id = self.owners.get(&conduit)?;
        self.conduits
            .get(user_id)?
            .peers
            .iter()
            .find(|p| &p.pairing == pairing)
            .map(|p| &p.link)
    }

    /// Forget peer socket `peer`, removing its pairing from both sides.
    pub fn remove_peer(&mut self, peer: ConnId) -> Option<Pairing> {
        let pairing = self.peers.remove(&peer)?.pairing?;
        if let Some(user_id) = self.owners.get(&pairing.conduit.id()) {
            if let Some(slot) = self.conduits.get_mut(user_id) {
                slot.peers.retain(|p| p.link.id() != peer);
            }
        }
        Some(pairing)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.conduits
            .get(user_id)
            .is_some_and(|slot| slot.link.is_open())
    }

    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .conduits
            .iter()
            .filter(|(_, slot)| slot.link.is_open())
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    /// Number of peers paired to the conduit registered for `user_id`.
    pub fn peer_count(&self, user_id: &str) -> usize {
        self.conduits.get(user_id).map_or(0, |slot| slot.peers.len())
    }

    /// Every tracked socket, conduits first.
    pub fn links(&self) -> Vec<Link> {
        self.conduits
            .values()
            .map(|slot| slot.link.clone())
            .chain(self.peers.values().map(|slot| slot.link.clone()))
            .collect()
    }

    pub fn conduit_count(&self) -> usize {
        self.conduits.len()
    }

    pub fn peer_socket_count(&self) -> usize {
        self.peers.len()
    }
}
