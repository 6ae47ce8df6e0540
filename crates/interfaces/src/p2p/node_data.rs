use crate::p2p::{downloader::DownloadClient, error::PeerRequestResult};
use async_trait::async_trait;
use cairn_primitives::H256;

/// A client capable of fetching state trie nodes by their content hash.
///
/// Served by full nodes only; used for fast sync to pull a pivot state
/// without executing the chain up to it. Responses are self-verifying: the
/// keccak of the returned bytes must equal the requested hash.
#[async_trait]
pub trait NodeDataClient: DownloadClient {
    /// Fetches the raw node bytes for the requested content hashes.
    async fn get_node_data(&self, hashes: Vec<H256>) -> PeerRequestResult<Vec<Vec<u8>>>;
}
