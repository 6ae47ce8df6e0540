use crate::p2p::{downloader::DownloadClient, error::PeerRequestResult, priority::Priority};
use async_trait::async_trait;
use cairn_primitives::{BlockHashOrNumber, Header, HeadersDirection};

/// The parameters of a headers request.
///
/// `skip` requests a skeleton: the responder returns every `skip + 1`-th
/// header starting at `start`, which lets a syncing node bound a large range
/// with few headers before backfilling densely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersRequest {
    /// The first header to return.
    pub start: BlockHashOrNumber,
    /// Maximum number of headers to return.
    pub limit: u64,
    /// Number of headers to skip between returned entries.
    pub skip: u64,
    /// Whether numbers rise or fall from `start`.
    pub direction: HeadersDirection,
}

/// A client capable of fulfilling header requests.
#[async_trait]
pub trait HeadersClient: DownloadClient {
    /// Fetch headers according to the request.
    async fn get_headers(&self, request: HeadersRequest) -> PeerRequestResult<Vec<Header>> {
        self.get_headers_with_priority(request, Priority::Normal).await
    }

    /// Fetch headers according to the request with the given priority.
    async fn get_headers_with_priority(
        &self,
        request: HeadersRequest,
        priority: Priority,
    ) -> PeerRequestResult<Vec<Header>>;
}
