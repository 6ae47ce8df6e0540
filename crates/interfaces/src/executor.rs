use cairn_primitives::{Address, H256};
use thiserror::Error;

/// Block execution errors.
///
/// These are raised while applying a block's transactions to its parent
/// state, or when comparing the outcome against the header's declared
/// commitments. All of them permanently condemn the block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockExecutionError {
    /// The computed state root differs from the header's declaration.
    #[error("state root {got} does not match header declaration {expected}")]
    StateRootMismatch {
        /// Root declared by the header.
        expected: H256,
        /// Root computed by execution.
        got: H256,
    },
    /// The computed receipts root differs from the header's declaration.
    #[error("receipts root {got} does not match header declaration {expected}")]
    ReceiptsRootMismatch {
        /// Root declared by the header.
        expected: H256,
        /// Root computed by execution.
        got: H256,
    },
    /// The block's declared gas used differs from the sum of execution.
    #[error("block gas used {got} is different from expected {expected}")]
    BlockGasUsedMismatch {
        /// Gas used declared by the header.
        expected: u64,
        /// Gas consumed by execution.
        got: u64,
    },
    /// A transaction's signature did not recover.
    #[error("could not recover the sender of transaction {hash}")]
    SenderRecoveryFailed {
        /// The offending transaction's hash.
        hash: H256,
    },
    /// A transaction's nonce does not match the sender account.
    #[error("transaction nonce {tx} does not match account nonce {state} for {sender}")]
    NonceMismatch {
        /// The sending account.
        sender: Address,
        /// Nonce carried by the transaction.
        tx: u64,
        /// Nonce recorded in state.
        state: u64,
    },
    /// The sender cannot cover value plus gas allowance.
    #[error("sender {sender} has insufficient funds for transaction {hash}")]
    InsufficientFunds {
        /// The sending account.
        sender: Address,
        /// The offending transaction's hash.
        hash: H256,
    },
    /// A transaction's gas limit cannot cover its intrinsic cost.
    #[error("intrinsic gas of transaction {hash} exceeds its gas limit")]
    IntrinsicGasTooHigh {
        /// The offending transaction's hash.
        hash: H256,
    },
    /// The block's transactions exceed the block gas limit.
    #[error("cumulative gas {used} exceeds block gas limit {limit}")]
    BlockGasLimitExceeded {
        /// Gas consumed so far.
        used: u64,
        /// The block's gas limit.
        limit: u64,
    },
    /// The state backend failed while executing.
    #[error("state access failed: {0}")]
    StateAccess(String),
}
