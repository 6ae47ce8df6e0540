#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Peer tracking and request distribution for cairn.
//!
//! [`PeerSet`] owns the records of connected peers (advertised head,
//! protocol version, reputation, outstanding-request accounting);
//! [`PeerDistributor`] multiplexes data requests across them with deadlines,
//! penalizing misbehavior and retrying elsewhere. The wire vocabulary lives
//! in [`messages`].

mod distributor;
/// Wire message kinds exchanged with peers.
pub mod messages;
mod peer;
mod set;

pub use distributor::{PeerDistributor, PeerTransport};
pub use peer::{Peer, ReputationChangeKind, BAN_THRESHOLD};
pub use set::{PeerSet, PeerSetError};
