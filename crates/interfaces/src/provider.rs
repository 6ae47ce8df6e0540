use cairn_primitives::{Account, Address, BlockHash, BlockNumber, Header, H256, U256};
use thiserror::Error;

/// Errors raised by chain and state data providers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The requested block hash is unknown.
    #[error("block hash {0} not found")]
    BlockHashNotFound(BlockHash),
    /// The requested block number has no canonical entry.
    #[error("no canonical block at number {0}")]
    CanonicalHashNotFound(BlockNumber),
    /// The requested state root is not retrievable.
    #[error("state for root {0} not found")]
    StateRootNotFound(H256),
    /// The underlying storage failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Read access to headers and the canonical index.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait HeaderProvider: Send + Sync {
    /// Whether a block with this hash is known.
    fn is_known(&self, block_hash: &BlockHash) -> crate::Result<bool> {
        Ok(self.header(block_hash)?.is_some())
    }

    /// The header with the given hash, if known.
    fn header(&self, block_hash: &BlockHash) -> crate::Result<Option<Header>>;

    /// The canonical header at the given number, if any.
    fn header_by_number(&self, num: u64) -> crate::Result<Option<Header>>;

    /// The accumulated weight of the block with the given hash.
    fn total_difficulty(&self, block_hash: &BlockHash) -> crate::Result<Option<U256>>;
}

/// Read access to account state.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait AccountProvider: Send + Sync {
    /// The basic account at the given address, if it exists.
    fn basic_account(&self, address: Address) -> crate::Result<Option<Account>>;
}
