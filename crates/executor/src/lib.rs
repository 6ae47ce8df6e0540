#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Block execution for cairn.
//!
//! Applies a block's transactions to its parent's committed state and checks
//! the outcome against the header's declarations. Payload interpretation is
//! an external collaborator; this crate owns the transfer/fee/nonce
//! bookkeeping, receipts, rewards and root verification.

mod executor;

pub use executor::{create_address, BlockExecutor, ExecutionOutcome};
