/// Result alias for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error variants possible when interacting with the blockchain.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    Consensus(#[from] crate::consensus::ConsensusError),

    #[error(transparent)]
    Execution(#[from] crate::executor::BlockExecutionError),

    #[error(transparent)]
    Provider(#[from] crate::provider::ProviderError),

    #[error("{0}")]
    Custom(String),
}
