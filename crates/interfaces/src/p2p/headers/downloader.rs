use crate::{
    consensus::Consensus,
    p2p::{
        downloader::{DownloadStream, Downloader},
        error::{DownloadError, DownloadResult},
    },
};
use cairn_primitives::{SealedHeader, H256};

/// A downloader capable of fetching block headers.
///
/// A downloader represents a distinct strategy for submitting header
/// requests, while a [`HeadersClient`] represents a client capable of
/// fulfilling them.
///
/// [`HeadersClient`]: super::client::HeadersClient
pub trait HeaderDownloader: Downloader {
    /// Stream the headers from `tip` down to (excluding) `head`.
    fn stream(&self, head: SealedHeader, tip: H256) -> DownloadStream<'_, SealedHeader>;

    /// Validate whether the header is valid in relation to its parent.
    fn validate(&self, header: &SealedHeader, parent: &SealedHeader) -> DownloadResult<()> {
        validate_header_download(self.consensus(), header, parent)
    }
}

/// Validates a downloaded header against its parent under the given
/// consensus rules.
pub fn validate_header_download<C: Consensus>(
    consensus: &C,
    header: &SealedHeader,
    parent: &SealedHeader,
) -> DownloadResult<()> {
    ensure_parent(header, parent)?;
    consensus
        .validate_header(header, parent)
        .map_err(|error| DownloadError::HeaderValidation { hash: header.hash(), error })?;
    Ok(())
}

/// Ensures that the given `parent` header is the actual parent of `header`.
pub fn ensure_parent(header: &SealedHeader, parent: &SealedHeader) -> DownloadResult<()> {
    if !(parent.hash() == header.parent_hash && parent.number + 1 == header.number) {
        return Err(DownloadError::MismatchedHeaders {
            header_number: header.number,
            parent_number: parent.number,
            header_hash: header.hash(),
            parent_hash: parent.hash(),
        })
    }
    Ok(())
}
