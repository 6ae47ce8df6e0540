use cairn_primitives::{PeerId, H256, U256};

/// Score below which a peer is banned and disconnected.
pub const BAN_THRESHOLD: i32 = -100;

/// Classified peer misbehavior, each with its reputation price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationChangeKind {
    /// Sent a message that failed validation.
    BadMessage,
    /// Served a header that failed consensus checks.
    BadHeader,
    /// Served a body that did not match its header.
    BadBody,
    /// Let a request run into its deadline.
    Timeout,
    /// Answered a request it was never sent, or answered twice.
    UnrequestedResponse,
}

impl ReputationChangeKind {
    /// The score delta this misbehavior costs.
    pub fn weight(&self) -> i32 {
        match self {
            ReputationChangeKind::BadMessage => -50,
            ReputationChangeKind::BadHeader => -60,
            ReputationChangeKind::BadBody => -60,
            ReputationChangeKind::Timeout => -20,
            ReputationChangeKind::UnrequestedResponse => -30,
        }
    }
}

/// The record of one connected peer.
///
/// Created on handshake, dropped on disconnect; owned exclusively by the
/// [`PeerSet`](crate::PeerSet).
#[derive(Debug, Clone)]
pub struct Peer {
    /// The peer's network identity.
    pub id: PeerId,
    /// Protocol capability version from the handshake.
    pub version: u32,
    /// The head hash the peer advertised most recently.
    pub head_hash: H256,
    /// The accumulated difficulty the peer claims for its head.
    pub head_td: U256,
    /// Reputation score; negative is bad.
    pub score: i32,
    /// Requests currently in flight to this peer.
    pub inflight: usize,
}

impl Peer {
    /// A fresh peer record from handshake data.
    pub fn new(id: PeerId, version: u32, head_hash: H256, head_td: U256) -> Self {
        Self { id, version, head_hash, head_td, score: 0, inflight: 0 }
    }

    /// Whether the peer's score fell below the ban threshold.
    pub fn is_banned(&self) -> bool {
        self.score <= BAN_THRESHOLD
    }
}
