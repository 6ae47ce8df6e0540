use cairn_primitives::H256;
use thiserror::Error;

/// Errors raised by trie and state operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A referenced trie node is not present in the store.
    ///
    /// For committed roots this means the retention window was exceeded or
    /// the store was pruned; during fast sync it means the node was simply
    /// not downloaded yet.
    #[error("trie node {0} missing from store")]
    NodeMissing(H256),
    /// A stored node or leaf payload failed to decode.
    #[error("failed to decode trie data: {0}")]
    Decode(String),
    /// Arithmetic on an account balance over- or underflowed.
    #[error("balance arithmetic overflow for account")]
    BalanceOverflow,
}
