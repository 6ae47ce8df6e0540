#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Commonly used types in cairn.
//!
//! This crate contains the block, transaction and account primitives shared by
//! every other crate in the workspace, together with the hashing helpers that
//! give them their identity.

mod account;
mod block;
pub mod bloom;
mod chain;
pub mod constants;
mod header;
mod log;
mod peer;
mod receipt;
mod transaction;

/// Helper functions for calculating ordered commitments over block contents.
pub mod proofs;

pub use account::Account;
pub use block::{Block, BlockBody, BlockHashOrNumber, BlockNumHash, SealedBlock};
pub use bloom::Bloom;
pub use chain::{ChainInfo, ChainSpec, EngineKind, Genesis, GenesisAccount};
pub use header::{Header, HeadersDirection, SealedHeader};
pub use log::Log;
pub use peer::{PeerId, WithPeerId};
pub use receipt::Receipt;
pub use transaction::{
    sign_message, Signature, Transaction, TransactionKind, TransactionSigned,
    TransactionSignedEcRecovered, TxError,
};

pub use primitive_types::{H160, H256, H512, U256};

/// A block hash.
pub type BlockHash = H256;
/// A block number.
pub type BlockNumber = u64;
/// An account address.
pub type Address = H160;
/// A transaction hash, the keccak256 of the encoded signed transaction.
pub type TxHash = H256;
/// Chain identifier used for replay protection.
pub type ChainId = u64;
/// An account storage slot key.
pub type StorageKey = H256;
/// An account storage slot value.
pub type StorageValue = U256;

/// Returns the keccak256 hash of the given data.
pub fn keccak256(data: impl AsRef<[u8]>) -> H256 {
    use tiny_keccak::{Hasher, Keccak};

    let mut keccak = Keccak::v256();
    keccak.update(data.as_ref());
    let mut output = [0; 32];
    keccak.finalize(&mut output);
    H256(output)
}

/// Returns the keccak256 hash of the canonical binary encoding of the value.
///
/// This is the identity function for headers and transactions: two values are
/// the same object iff their encoded hashes are equal.
pub fn hash_encoded<T: serde::Serialize>(value: &T) -> H256 {
    keccak256(encode(value))
}

/// Canonical binary encoding of a value.
pub fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    // All encodable primitives are plain in-memory values without shared or
    // cyclic structure, for which bincode cannot fail.
    bincode::serialize(value).expect("canonical encoding is infallible")
}
