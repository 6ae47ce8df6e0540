#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! The cairn transaction pool.
//!
//! Maintains the set of transactions not yet included in a block, split into
//! `pending` (includable now) and `queued` (nonce-gapped or unfunded), kept
//! consistent with the canonical chain through synchronous head-change
//! notifications. Ordering for block assembly and propagation is by
//! effective gas price with arrival order as the tie break.

mod config;
mod error;
mod journal;
mod ordering;
mod pool;
mod validate;

pub use config::PoolConfig;
pub use error::{InvalidPoolTransactionError, PoolError, PoolResult};
pub use ordering::{GasPriceOrdering, TransactionOrdering};
pub use pool::{
    AddedTransaction, Pool, PoolSize, PoolStats, PoolStatsSnapshot, TransactionOrigin,
    ValidPoolTransaction,
};
pub use validate::TransactionValidator;
