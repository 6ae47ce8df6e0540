#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Block, receipt and chain index storage for cairn.
//!
//! [`BlockStore`] owns the persisted header/body/receipt records, keyed by
//! block hash, together with two indices: the mutable canonical
//! number→hash mapping (the only place where historical data changes
//! identity, on reorg) and the append-only hash→total-difficulty mapping.

mod store;

pub use store::BlockStore;
