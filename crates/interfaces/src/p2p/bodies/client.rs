use crate::p2p::{downloader::DownloadClient, error::PeerRequestResult, priority::Priority};
use async_trait::async_trait;
use cairn_primitives::{BlockBody, H256};

/// A client capable of downloading block bodies.
#[async_trait]
pub trait BodiesClient: DownloadClient {
    /// Fetches the block bodies for the requested hashes.
    async fn get_block_bodies(&self, hashes: Vec<H256>) -> PeerRequestResult<Vec<BlockBody>> {
        self.get_block_bodies_with_priority(hashes, Priority::Normal).await
    }

    /// Fetches the block bodies for the requested hashes with priority.
    async fn get_block_bodies_with_priority(
        &self,
        hashes: Vec<H256>,
        priority: Priority,
    ) -> PeerRequestResult<Vec<BlockBody>>;
}
