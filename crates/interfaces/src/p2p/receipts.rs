use crate::p2p::{downloader::DownloadClient, error::PeerRequestResult};
use async_trait::async_trait;
use cairn_primitives::{Receipt, H256};

/// A client capable of downloading receipt lists for blocks.
#[async_trait]
pub trait ReceiptsClient: DownloadClient {
    /// Fetches the receipts for the requested block hashes, one list per
    /// block, in request order.
    async fn get_receipts(&self, hashes: Vec<H256>) -> PeerRequestResult<Vec<Vec<Receipt>>>;
}
