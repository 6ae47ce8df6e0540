use crate::provider::HeaderProvider;
use cairn_primitives::{Address, BlockNumber, Header, SealedHeader, H256, U256};
use std::fmt::Debug;
use thiserror::Error;

/// Consensus is the protocol that decides what a valid block looks like.
///
/// The capability set is deliberately closed: header verification, ommer
/// verification, reward finalization, author recovery and sealing. Fork
/// choice itself lives in the chain, driven by the weights these rules
/// produce.
pub trait Consensus: Debug + Send + Sync {
    /// Validate the parts of a header that need no chain context.
    ///
    /// Cheap checks run here so garbage is rejected before any parent lookup.
    fn validate_header_standalone(&self, header: &SealedHeader) -> Result<(), ConsensusError>;

    /// Validate a header against its parent, including the engine-specific
    /// difficulty rule and seal.
    fn validate_header(
        &self,
        header: &SealedHeader,
        parent: &SealedHeader,
    ) -> Result<(), ConsensusError>;

    /// Validate the ommer headers referenced by a block.
    fn validate_ommers(
        &self,
        header: &SealedHeader,
        ommers: &[Header],
        provider: &dyn HeaderProvider,
    ) -> Result<(), ConsensusError>;

    /// The reward credits to apply to state after the block's transactions.
    ///
    /// Returned as `(address, amount)` pairs so the executor owns all state
    /// mutation.
    fn finalize(
        &self,
        header: &SealedHeader,
        ommers: &[Header],
    ) -> Result<Vec<(Address, U256)>, ConsensusError>;

    /// The account that produced this block.
    fn author(&self, header: &SealedHeader) -> Result<Address, ConsensusError>;

    /// Attach a valid seal to the given header.
    fn seal(&self, header: Header) -> Result<Header, ConsensusError>;
}

/// Consensus verification errors.
///
/// Every variant is a permanent verdict for the header object it was raised
/// for; callers must not retry and should penalize the peer that supplied it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The header's number is not `parent.number + 1`.
    #[error("block number {block_number} does not follow parent number {parent_block_number}")]
    ParentBlockNumberMismatch {
        /// The parent's block number.
        parent_block_number: BlockNumber,
        /// The header's block number.
        block_number: BlockNumber,
    },
    /// The header's timestamp does not exceed its parent's.
    #[error("timestamp {timestamp} is not after parent timestamp {parent_timestamp}")]
    TimestampIsInPast {
        /// The parent's timestamp.
        parent_timestamp: u64,
        /// The header's timestamp.
        timestamp: u64,
    },
    /// The header's timestamp is further in the future than allowed.
    #[error("timestamp {timestamp} exceeds present {present_timestamp} beyond allowed drift")]
    FutureBlock {
        /// The header's timestamp.
        timestamp: u64,
        /// The local clock at validation time.
        present_timestamp: u64,
    },
    /// The header's extra data exceeds the allowed size.
    #[error("extra data length {len} exceeds maximum")]
    ExtraDataExceedsMax {
        /// Observed extra data length.
        len: usize,
    },
    /// The header declares more gas used than its limit.
    #[error("gas used {gas_used} exceeds gas limit {gas_limit}")]
    HeaderGasUsedExceedsGasLimit {
        /// Declared gas used.
        gas_used: u64,
        /// Declared gas limit.
        gas_limit: u64,
    },
    /// The gas limit increased by more than the allowed fraction.
    #[error("gas limit {child_gas_limit} invalid increase from parent {parent_gas_limit}")]
    GasLimitInvalidIncrease {
        /// The parent's gas limit.
        parent_gas_limit: u64,
        /// The header's gas limit.
        child_gas_limit: u64,
    },
    /// The gas limit decreased by more than the allowed fraction.
    #[error("gas limit {child_gas_limit} invalid decrease from parent {parent_gas_limit}")]
    GasLimitInvalidDecrease {
        /// The parent's gas limit.
        parent_gas_limit: u64,
        /// The header's gas limit.
        child_gas_limit: u64,
    },
    /// The declared difficulty does not match the retarget formula.
    #[error("difficulty {got} does not match expected {expected}")]
    DifficultyMismatch {
        /// Difficulty required by the retarget rule.
        expected: U256,
        /// Difficulty the header declares.
        got: U256,
    },
    /// The proof-of-work or authority seal failed verification.
    #[error("invalid seal on header {hash}")]
    InvalidSeal {
        /// Hash of the offending header.
        hash: H256,
    },
    /// The recovered authority is not in the signer set.
    #[error("unauthorized signer {signer}")]
    UnknownAuthority {
        /// The recovered signer.
        signer: Address,
    },
    /// The authority signed again inside its spacing window.
    #[error("signer {signer} signed recently")]
    AuthoritySignedRecently {
        /// The offending signer.
        signer: Address,
    },
    /// Two distinct blocks at one number signed by the same authority.
    #[error("signer {signer} equivocated at block {number}")]
    AuthorityEquivocation {
        /// The equivocating signer.
        signer: Address,
        /// The block number signed twice.
        number: BlockNumber,
    },
    /// A vote header carries an invalid vote encoding.
    #[error("invalid authority vote in header")]
    InvalidVote,
    /// The engine forbids ommers but the block carries some.
    #[error("ommers are not allowed under this engine")]
    OmmersNotAllowed,
    /// More ommers than the engine permits.
    #[error("too many ommers: {count}")]
    TooManyOmmers {
        /// Number of ommers in the block.
        count: usize,
    },
    /// An ommer is outside the allowed ancestor depth.
    #[error("ommer {ommer} too deep for block {number}")]
    OmmerTooDeep {
        /// The including block's number.
        number: BlockNumber,
        /// The ommer's number.
        ommer: BlockNumber,
    },
    /// The same ommer appears twice.
    #[error("duplicate ommer {hash}")]
    DuplicateOmmer {
        /// The duplicated ommer's hash.
        hash: H256,
    },
    /// An ommer is a direct ancestor of the including block.
    #[error("ommer {hash} is a canonical ancestor")]
    OmmerIsAncestor {
        /// The offending ommer's hash.
        hash: H256,
    },
    /// An ommer's parent is not a known near ancestor.
    #[error("ommer parent {hash} unknown")]
    OmmerParentUnknown {
        /// The unknown parent hash.
        hash: H256,
    },
    /// The body's ommers do not match the header commitment.
    #[error("ommers hash {got} does not match header commitment {expected}")]
    BodyOmmersHashDiff {
        /// Computed commitment.
        got: H256,
        /// Header-declared commitment.
        expected: H256,
    },
    /// The body's transactions do not match the header commitment.
    #[error("transaction root {got} does not match header commitment {expected}")]
    BodyTransactionRootDiff {
        /// Computed commitment.
        got: H256,
        /// Header-declared commitment.
        expected: H256,
    },
    /// The block is already known.
    #[error("block {hash} at {number} is already known")]
    BlockKnown {
        /// The known block's hash.
        hash: H256,
        /// The known block's number.
        number: BlockNumber,
    },
    /// The block's parent is not known.
    #[error("parent block {hash} unknown")]
    ParentUnknown {
        /// The missing parent hash.
        hash: H256,
    },
    /// A transaction's signature did not recover to a signer.
    #[error("transaction signer recovery failed")]
    TransactionSignerRecoveryError,
    /// A transaction's nonce does not follow the sender's sequence.
    #[error("transaction nonce not consistent with sender account")]
    TransactionNonceNotConsistent,
    /// A transaction claims a different chain.
    #[error("transaction chain id mismatch")]
    TransactionChainId,
    /// A transaction's gas limit exceeds the block gas limit.
    #[error("transaction gas limit {gas_limit} exceeds block gas limit {block_gas_limit}")]
    TransactionGasLimitExceedsBlockGasLimit {
        /// The transaction's gas limit.
        gas_limit: u64,
        /// The block's gas limit.
        block_gas_limit: u64,
    },
    /// A sending account has deployed code.
    #[error("signer account has bytecode")]
    SignerAccountHasBytecode,
    /// Sealing was requested from an engine that cannot seal.
    #[error("engine cannot seal: {reason}")]
    CannotSeal {
        /// Why sealing is unavailable.
        reason: &'static str,
    },
}
