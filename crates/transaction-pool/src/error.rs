use cairn_primitives::{Address, TxHash, U256};
use thiserror::Error;

/// Transaction pool result type.
pub type PoolResult<T> = Result<T, PoolError>;

/// All ways the pool can refuse a transaction.
///
/// These are policy verdicts, not systemic failures: the submitter gets the
/// reason back and the node carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The exact transaction is already in the pool.
    #[error("transaction {0} already imported")]
    AlreadyImported(TxHash),
    /// A same-nonce transaction exists and the replacement does not pay the
    /// required price bump.
    #[error("replacement transaction underpriced, existing {0}")]
    ReplacementUnderpriced(TxHash),
    /// The transaction pays less than the pool's price floor.
    #[error("transaction gas price {price} below pool floor {floor}")]
    Underpriced {
        /// Offered gas price.
        price: u128,
        /// Configured floor.
        floor: u128,
    },
    /// The sender exceeds its transaction slot allowance.
    #[error("sender {0} exceeds its pool slot capacity")]
    SpammerExceededCapacity(Address),
    /// The pool is full and this transaction is cheaper than everything
    /// evictable.
    #[error("pool is full and transaction does not pay enough to displace others")]
    PoolFull,
    /// The transaction failed stateful validation.
    #[error(transparent)]
    Invalid(#[from] InvalidPoolTransactionError),
}

/// Stateful and stateless validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidPoolTransactionError {
    /// The signature did not recover to a sender.
    #[error("invalid signature")]
    SignatureInvalid,
    /// The transaction targets a different chain.
    #[error("chain id mismatch")]
    ChainIdMismatch,
    /// The nonce was already used by the sender.
    #[error("nonce {tx} too low, account nonce is {state}")]
    NonceTooLow {
        /// Nonce carried by the transaction.
        tx: u64,
        /// The sender's current account nonce.
        state: u64,
    },
    /// The sender cannot cover value plus gas allowance.
    #[error("insufficient funds: cost {cost} exceeds balance {balance}")]
    InsufficientFunds {
        /// Required balance.
        cost: U256,
        /// Available balance.
        balance: U256,
    },
    /// The gas limit exceeds the current block gas limit.
    #[error("gas limit {gas_limit} exceeds block gas limit {block_gas_limit}")]
    ExceedsBlockGasLimit {
        /// The transaction's gas limit.
        gas_limit: u64,
        /// The block gas limit at the current head.
        block_gas_limit: u64,
    },
    /// The gas limit cannot cover the intrinsic gas.
    #[error("gas limit below intrinsic gas")]
    IntrinsicGasTooLow,
}
