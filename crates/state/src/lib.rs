#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Versioned account state for cairn.
//!
//! State is a mapping from address to [`Account`](cairn_primitives::Account),
//! committed to by the root of a content-addressed Merkle trie. Because nodes
//! are keyed by the hash of their encoding, a root uniquely identifies a full
//! state, identical subtrees are stored once, and historical states stay
//! readable for as long as their nodes are retained.

mod error;
mod state;
mod trie;

pub use error::StateError;
pub use state::{genesis_state_root, State};
pub use trie::{Node, NodeStore};
