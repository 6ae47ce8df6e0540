use crate::peer::{Peer, ReputationChangeKind};
use cairn_primitives::{PeerId, H256, U256};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from peer lifecycle operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerSetError {
    /// The peer is already connected.
    #[error("peer already registered")]
    AlreadyRegistered,
    /// The peer was banned earlier and may not reconnect.
    #[error("peer is banned")]
    Banned,
}

/// The set of currently connected peers.
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: RwLock<HashMap<PeerId, Peer>>,
    banned: RwLock<HashSet<PeerId>>,
}

impl PeerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer after a successful handshake.
    pub fn register(
        &self,
        id: PeerId,
        version: u32,
        head_hash: H256,
        head_td: U256,
    ) -> Result<(), PeerSetError> {
        if self.banned.read().contains(&id) {
            return Err(PeerSetError::Banned)
        }
        let mut peers = self.peers.write();
        if peers.contains_key(&id) {
            return Err(PeerSetError::AlreadyRegistered)
        }
        debug!(target: "peers", peer = ?id, version, "peer registered");
        peers.insert(id, Peer::new(id, version, head_hash, head_td));
        Ok(())
    }

    /// Removes a peer on disconnect.
    pub fn unregister(&self, id: &PeerId) {
        if self.peers.write().remove(id).is_some() {
            debug!(target: "peers", peer = ?id, "peer unregistered");
        }
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether no peers are connected.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// A copy of the peer's record, if connected.
    pub fn peer(&self, id: &PeerId) -> Option<Peer> {
        self.peers.read().get(id).cloned()
    }

    /// Copies of all connected peer records.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.read().values().cloned().collect()
    }

    /// Records a new advertised head for the peer.
    pub fn update_head(&self, id: &PeerId, head_hash: H256, head_td: U256) {
        if let Some(peer) = self.peers.write().get_mut(id) {
            peer.head_hash = head_hash;
            peer.head_td = head_td;
        }
    }

    /// Applies a reputation change; bans and drops the peer if it crossed
    /// the threshold.
    pub fn report(&self, id: &PeerId, kind: ReputationChangeKind) {
        let mut peers = self.peers.write();
        let Some(peer) = peers.get_mut(id) else { return };
        peer.score += kind.weight();
        if peer.is_banned() {
            warn!(target: "peers", peer = ?id, score = peer.score, ?kind, "peer banned");
            peers.remove(id);
            self.banned.write().insert(*id);
        }
    }

    /// Whether the peer is banned.
    pub fn is_banned(&self, id: &PeerId) -> bool {
        self.banned.read().contains(id)
    }

    /// The peer advertising the heaviest head.
    pub fn best_peer(&self) -> Option<Peer> {
        self.peers.read().values().max_by_key(|p| p.head_td).cloned()
    }

    /// The connected peer with the fewest requests in flight.
    pub fn idle_peer(&self) -> Option<Peer> {
        self.peers.read().values().min_by_key(|p| p.inflight).cloned()
    }

    /// Accounts a request dispatched to the peer.
    pub fn begin_request(&self, id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(id) {
            peer.inflight += 1;
        }
    }

    /// Accounts a request completed (or abandoned) at the peer.
    pub fn end_request(&self, id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(id) {
            peer.inflight = peer.inflight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> PeerId {
        PeerId::repeat_byte(byte)
    }

    #[test]
    fn register_and_best_peer() {
        let set = PeerSet::new();
        set.register(id(1), 1, H256::zero(), U256::from(10u64)).unwrap();
        set.register(id(2), 1, H256::zero(), U256::from(20u64)).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.best_peer().unwrap().id, id(2));
        assert_eq!(
            set.register(id(1), 1, H256::zero(), U256::zero()),
            Err(PeerSetError::AlreadyRegistered)
        );
    }

    #[test]
    fn repeated_misbehavior_bans() {
        let set = PeerSet::new();
        set.register(id(1), 1, H256::zero(), U256::one()).unwrap();

        set.report(&id(1), ReputationChangeKind::BadHeader);
        assert_eq!(set.len(), 1, "one offence is not enough");
        set.report(&id(1), ReputationChangeKind::BadHeader);
        assert_eq!(set.len(), 0);
        assert!(set.is_banned(&id(1)));
        assert_eq!(
            set.register(id(1), 1, H256::zero(), U256::one()),
            Err(PeerSetError::Banned)
        );
    }

    #[test]
    fn idle_peer_tracks_inflight() {
        let set = PeerSet::new();
        set.register(id(1), 1, H256::zero(), U256::one()).unwrap();
        set.register(id(2), 1, H256::zero(), U256::one()).unwrap();

        set.begin_request(&id(1));
        assert_eq!(set.idle_peer().unwrap().id, id(2));
        set.end_request(&id(1));
        set.begin_request(&id(2));
        assert_eq!(set.idle_peer().unwrap().id, id(1));
    }
}
