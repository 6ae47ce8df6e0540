use crate::{BlockHash, BlockNumber, Header, SealedHeader, TransactionSigned, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A block: header plus body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// The ordered transactions.
    pub body: Vec<TransactionSigned>,
    /// Ommer headers referenced for partial reward credit.
    pub ommers: Vec<Header>,
}

impl Block {
    /// Seal the block, memoizing the header hash.
    pub fn seal(self) -> SealedBlock {
        SealedBlock { header: self.header.seal(), body: self.body, ommers: self.ommers }
    }
}

/// A block with a sealed header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SealedBlock {
    /// The sealed header.
    pub header: SealedHeader,
    /// The ordered transactions.
    pub body: Vec<TransactionSigned>,
    /// Ommer headers referenced for partial reward credit.
    pub ommers: Vec<Header>,
}

impl SealedBlock {
    /// Assembles a sealed block from a sealed header and a downloaded body.
    pub fn new(header: SealedHeader, body: BlockBody) -> Self {
        Self { header, body: body.transactions, ommers: body.ommers }
    }

    /// The block's identity hash.
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// The block height.
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// The parent block's hash.
    pub fn parent_hash(&self) -> BlockHash {
        self.header.parent_hash
    }

    /// Discard the memoized header hash.
    pub fn unseal(self) -> Block {
        Block { header: self.header.unseal(), body: self.body, ommers: self.ommers }
    }

    /// The block's body as sent over the wire.
    pub fn body(&self) -> BlockBody {
        BlockBody { transactions: self.body.clone(), ommers: self.ommers.clone() }
    }
}

/// The transactions and ommers of a block, as exchanged between peers.
///
/// A body on its own has no identity; it is only trusted once its computed
/// commitments match a verified header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockBody {
    /// The ordered transactions.
    pub transactions: Vec<TransactionSigned>,
    /// Ommer headers.
    pub ommers: Vec<Header>,
}

impl BlockBody {
    /// Commitment to this body's transactions.
    pub fn calculate_tx_root(&self) -> H256 {
        crate::proofs::calculate_transaction_root(self.transactions.iter())
    }

    /// Commitment to this body's ommers.
    pub fn calculate_ommers_root(&self) -> H256 {
        crate::proofs::calculate_ommers_root(self.ommers.iter())
    }
}

/// Either a block hash or a block number, as accepted by header requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockHashOrNumber {
    /// A block hash.
    Hash(BlockHash),
    /// A block number.
    Number(BlockNumber),
}

impl From<BlockHash> for BlockHashOrNumber {
    fn from(hash: BlockHash) -> Self {
        BlockHashOrNumber::Hash(hash)
    }
}

impl From<BlockNumber> for BlockHashOrNumber {
    fn from(number: BlockNumber) -> Self {
        BlockHashOrNumber::Number(number)
    }
}

/// A block number together with its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockNumHash {
    /// The block number.
    pub number: BlockNumber,
    /// The block hash.
    pub hash: BlockHash,
}

impl fmt::Display for BlockNumHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({:?})", self.number, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_commitments_match_header_construction() {
        let block = Block {
            header: Header::default(),
            body: vec![TransactionSigned::default()],
            ommers: vec![],
        };
        let sealed = block.seal();
        let body = sealed.body();
        assert_eq!(
            body.calculate_tx_root(),
            crate::proofs::calculate_transaction_root(sealed.body.iter())
        );
    }
}
