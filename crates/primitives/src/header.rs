use crate::{hash_encoded, Address, BlockNumber, H256, U256};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A block header.
///
/// The header commits to the block body through `transactions_root`,
/// `ommers_hash` and `receipts_root`, and to the post-execution state through
/// `state_root`. It is immutable once sealed; its identity is the keccak256 of
/// its canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    /// The keccak256 hash of the parent block's header.
    pub parent_hash: H256,
    /// The commitment to the list of ommer headers in the block body.
    pub ommers_hash: H256,
    /// The address that receives the block rewards and fees.
    pub beneficiary: Address,
    /// The root of the state trie after this block's transactions are applied.
    pub state_root: H256,
    /// The commitment to the ordered list of transactions in the body.
    pub transactions_root: H256,
    /// The commitment to the ordered list of receipts produced by execution.
    pub receipts_root: H256,
    /// The proof-of-work difficulty of this block, or the turn marker for
    /// proof-of-authority chains.
    pub difficulty: U256,
    /// Block height; always `parent.number + 1`.
    pub number: BlockNumber,
    /// Maximum gas the block's transactions may consume together.
    pub gas_limit: u64,
    /// Gas actually consumed by the block's transactions.
    pub gas_used: u64,
    /// Unix timestamp at which the block was sealed.
    pub timestamp: u64,
    /// Arbitrary bounded payload. Proof-of-authority chains append the
    /// 65-byte seal signature here.
    pub extra_data: Bytes,
    /// Proof-of-work intermediate digest, bound to `nonce`.
    pub mix_hash: H256,
    /// Proof-of-work seal nonce.
    pub nonce: u64,
}

impl Header {
    /// Computes the identity hash of this header.
    pub fn hash_slow(&self) -> H256 {
        hash_encoded(self)
    }

    /// Seal the header, memoizing its hash.
    pub fn seal(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }

    /// The hash the proof-of-work seal commits to: this header with its seal
    /// fields (`mix_hash`, `nonce`) cleared.
    pub fn seal_hash(&self) -> H256 {
        let mut unsealed = self.clone();
        unsealed.mix_hash = H256::zero();
        unsealed.nonce = 0;
        hash_encoded(&unsealed)
    }

    /// True if the header carries no ommers.
    pub fn ommers_hash_is_empty(&self) -> bool {
        self.ommers_hash == crate::constants::EMPTY_OMMER_ROOT
    }
}

/// A [`Header`] with its memoized identity hash.
///
/// Sealing is a one-way door: the hash is computed once and the header fields
/// are only reachable immutably afterwards. Tests that need to tamper with a
/// sealed header must unseal it first via [`SealedHeader::unseal`].
///
/// On the wire and on disk only the header travels; the hash is recomputed
/// on decode, so nothing external can plant a mismatched identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SealedHeader {
    header: Header,
    hash: H256,
}

impl Serialize for SealedHeader {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.header.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SealedHeader {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Header::deserialize(deserializer).map(Header::seal)
    }
}

impl SealedHeader {
    /// Assembles a sealed header from parts.
    ///
    /// The caller is responsible for `hash` actually being the header's hash.
    pub fn new(header: Header, hash: H256) -> Self {
        Self { header, hash }
    }

    /// The memoized header hash.
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// The header's number and hash as a pair.
    pub fn num_hash(&self) -> crate::BlockNumHash {
        crate::BlockNumHash { number: self.header.number, hash: self.hash }
    }

    /// Discard the memoized hash, yielding the raw header.
    pub fn unseal(self) -> Header {
        self.header
    }
}

impl Deref for SealedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl AsRef<Header> for SealedHeader {
    fn as_ref(&self) -> &Header {
        &self.header
    }
}

/// The direction of a headers request relative to its start block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadersDirection {
    /// Ascending block numbers.
    Rising,
    /// Descending block numbers.
    Falling,
}

impl HeadersDirection {
    /// Whether the requested headers are in ascending order.
    pub fn is_rising(&self) -> bool {
        matches!(self, HeadersDirection::Rising)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_hash_matches_slow_hash() {
        let header = Header { number: 7, gas_limit: 8_000_000, ..Default::default() };
        let sealed = header.clone().seal();
        assert_eq!(sealed.hash(), header.hash_slow());
    }

    #[test]
    fn seal_hash_ignores_seal_fields() {
        let mut header = Header { number: 1, ..Default::default() };
        let before = header.seal_hash();
        header.nonce = 42;
        header.mix_hash = H256::repeat_byte(0xab);
        assert_eq!(header.seal_hash(), before);
        assert_ne!(header.hash_slow(), before);
    }

    #[test]
    fn tampering_changes_identity() {
        let sealed = Header { number: 3, ..Default::default() }.seal();
        let mut tampered = sealed.clone().unseal();
        tampered.timestamp += 1;
        assert_ne!(tampered.hash_slow(), sealed.hash());
    }
}
