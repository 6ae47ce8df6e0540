use super::headers::client::HeadersRequest;
use crate::consensus::ConsensusError;
use cairn_primitives::{BlockHashOrNumber, BlockNumber, Header, WithPeerId, H256};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Result alias for the outcome of a single peer request.
pub type RequestResult<T> = Result<T, RequestError>;

/// A [`RequestResult`] carrying the serving peer's id.
pub type PeerRequestResult<T> = RequestResult<WithPeerId<T>>;

/// Helper trait used to judge responses against the request they answer.
pub trait ResponseValidator {
    /// Whether the response is malformed with respect to the request and the
    /// serving peer deserves penalization.
    fn is_likely_bad_headers_response(&self, request: &HeadersRequest) -> bool;
}

impl ResponseValidator for RequestResult<Vec<Header>> {
    fn is_likely_bad_headers_response(&self, request: &HeadersRequest) -> bool {
        match self {
            Ok(headers) => {
                let len = headers.len() as u64;
                if len > request.limit {
                    return true
                }
                match request.start {
                    BlockHashOrNumber::Number(number) => {
                        headers.first().map(|h| h.number != number).unwrap_or_default()
                    }
                    // Hashing every header to check is not worth it here; the
                    // downloader validates linkage anyway.
                    BlockHashOrNumber::Hash(_) => false,
                }
            }
            Err(_) => true,
        }
    }
}

/// Error variants that can happen when sending requests to a peer session.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum RequestError {
    #[error("closed channel to the peer")]
    ChannelClosed,
    #[error("connection to a peer dropped while handling the request")]
    ConnectionDropped,
    #[error("capability message is not supported by remote peer")]
    UnsupportedCapability,
    #[error("request timed out while awaiting response")]
    Timeout,
    #[error("received bad response")]
    BadResponse,
    #[error("no peer available to serve the request")]
    NoPeersAvailable,
}

impl RequestError {
    /// Indicates whether this error is retryable against another peer, as
    /// opposed to fatal for the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RequestError::Timeout | RequestError::ConnectionDropped)
    }
}

impl<T> From<mpsc::error::SendError<T>> for RequestError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        RequestError::ChannelClosed
    }
}

impl From<oneshot::error::RecvError> for RequestError {
    fn from(_: oneshot::error::RecvError) -> Self {
        RequestError::ChannelClosed
    }
}

/// The download result type.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// The downloader error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /* ==================== HEADER ERRORS ==================== */
    /// Header validation failed.
    #[error("failed to validate header {hash}: {error}")]
    HeaderValidation {
        /// Hash of the header failing validation.
        hash: H256,
        /// The validation failure.
        #[source]
        error: ConsensusError,
    },
    /// The header does not link to the parent it was checked against.
    #[error("headers did not match: {header_number} ({header_hash}) onto {parent_number} ({parent_hash})")]
    MismatchedHeaders {
        /// The header number being evaluated.
        header_number: BlockNumber,
        /// The header hash being evaluated.
        header_hash: H256,
        /// The parent number being evaluated.
        parent_number: BlockNumber,
        /// The parent hash being evaluated.
        parent_hash: H256,
    },
    /// The first header of a download did not match the requested tip.
    #[error("received invalid tip {received}, expected {expected}")]
    InvalidTip {
        /// Hash of the received tip.
        received: H256,
        /// Hash of the requested tip.
        expected: H256,
    },
    /* ==================== BODY ERRORS ==================== */
    /// A body's commitments do not match its header.
    #[error("failed to validate body for header {hash}: {error}")]
    BodyValidation {
        /// Hash of the header the body was checked against.
        hash: H256,
        /// The validation failure.
        #[source]
        error: ConsensusError,
    },
    /// Received more bodies than requested.
    #[error("received {received} bodies, requested {expected}")]
    TooManyBodies {
        /// How many bodies were received.
        received: usize,
        /// How many bodies were requested.
        expected: usize,
    },
    /* ==================== RECEIPT / STATE ERRORS ==================== */
    /// A receipt list does not match the header's receipts root.
    #[error("receipts for header {hash} do not match its receipts root")]
    ReceiptsRootMismatch {
        /// Hash of the header the receipts were checked against.
        hash: H256,
    },
    /// A state node's bytes do not hash to the requested key.
    #[error("state node hashed to {got}, requested {expected}")]
    NodeDataHashMismatch {
        /// The content hash that was requested.
        expected: H256,
        /// The hash of the bytes received.
        got: H256,
    },
    /* ==================== COMMON ERRORS ==================== */
    /// Received an empty response while expecting data.
    #[error("received empty response")]
    EmptyResponse,
    /// Error while executing the request.
    #[error(transparent)]
    RequestError(#[from] RequestError),
}
