#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Canonical chain management for cairn.
//!
//! [`BlockChain`] is the single authority on what the canonical chain is. It
//! re-validates and executes incoming blocks, runs fork choice on accumulated
//! difficulty, reorganizes when a heavier branch appears, and notifies the
//! transaction pool synchronously plus external subscribers asynchronously.

mod blockchain;
mod events;

pub use blockchain::{BlockChain, ChainConfig};
pub use events::{CanonStateListener, CanonicalStateUpdate, ChainEvent};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
