#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Cairn interface bindings.
//!
//! The traits and error taxonomy shared between the chain, consensus, pool
//! and networking crates. Implementations live a crate above; this crate is
//! the seam they meet at.

/// Consensus traits.
pub mod consensus;

/// Block execution traits.
pub mod executor;

/// Possible errors when interacting with the chain.
mod error;
pub use error::{Error, Result};

/// Canonical chain change notifications.
pub mod events;

/// P2P traits.
pub mod p2p;

/// Read access to chain and account data.
pub mod provider;

/// Syncing related traits.
pub mod sync;

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers for mocking out consensus, downloaders and clients.
pub mod test_utils;
