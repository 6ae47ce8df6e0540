//! Canned multi-protocol clients for downloader and sync tests.

use async_trait::async_trait;
use cairn_interfaces::p2p::{
    bodies::client::BodiesClient,
    downloader::DownloadClient,
    error::{PeerRequestResult, RequestError},
    headers::client::{HeadersClient, HeadersRequest},
    node_data::NodeDataClient,
    priority::Priority,
    receipts::ReceiptsClient,
};
use cairn_primitives::{
    BlockBody, BlockHashOrNumber, Header, PeerId, Receipt, SealedBlock, WithPeerId, H256,
};
use cairn_state::NodeStore;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};

/// A client serving headers, bodies, receipts and state nodes from canned
/// data: one fake peer with a complete chain.
#[derive(Debug, Default)]
pub struct TestFullClient {
    headers: Mutex<Vec<Header>>,
    bodies: Mutex<HashMap<H256, BlockBody>>,
    receipts: Mutex<HashMap<H256, Vec<Receipt>>>,
    state: Mutex<Option<Arc<NodeStore>>>,
    corrupt_nodes: Mutex<Vec<H256>>,
    bad_peers: Mutex<Vec<PeerId>>,
    delay: Mutex<Option<Duration>>,
}

impl TestFullClient {
    /// The peer id this client answers as.
    pub fn peer_id() -> PeerId {
        PeerId::repeat_byte(0x01)
    }

    /// Registers blocks to serve headers and bodies for.
    pub fn add_blocks<'a>(&self, blocks: impl IntoIterator<Item = &'a SealedBlock>) {
        let mut headers = self.headers.lock();
        let mut bodies = self.bodies.lock();
        for block in blocks {
            headers.push(block.header.as_ref().clone());
            bodies.insert(block.hash(), block.body());
        }
        headers.sort_unstable_by_key(|h| h.number);
        headers.dedup_by_key(|h| h.hash_slow());
    }

    /// Registers receipts for a block hash.
    pub fn insert_receipts(&self, hash: H256, receipts: Vec<Receipt>) {
        self.receipts.lock().insert(hash, receipts);
    }

    /// Serves state nodes out of the given store.
    pub fn serve_state(&self, store: &Arc<NodeStore>) {
        *self.state.lock() = Some(Arc::clone(store));
    }

    /// Makes the client deliver garbage bytes for the given node hash.
    pub fn corrupt_node(&self, hash: H256) {
        self.corrupt_nodes.lock().push(hash);
    }

    /// Delays every response, for cancellation tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// The peers reported as bad so far.
    pub fn bad_peers(&self) -> Vec<PeerId> {
        self.bad_peers.lock().clone()
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl DownloadClient for TestFullClient {
    fn report_bad_message(&self, peer_id: PeerId) {
        self.bad_peers.lock().push(peer_id);
    }

    fn num_connected_peers(&self) -> usize {
        1
    }
}

#[async_trait]
impl HeadersClient for TestFullClient {
    async fn get_headers_with_priority(
        &self,
        request: HeadersRequest,
        _priority: Priority,
    ) -> PeerRequestResult<Vec<Header>> {
        self.maybe_delay().await;
        let headers = self.headers.lock();
        let start = match request.start {
            BlockHashOrNumber::Hash(hash) => headers.iter().position(|h| h.hash_slow() == hash),
            BlockHashOrNumber::Number(number) => {
                headers.iter().position(|h| h.number == number)
            }
        };
        let Some(start) = start else {
            return Ok(WithPeerId::new(Self::peer_id(), Vec::new()))
        };

        let step = request.skip as usize + 1;
        let mut out = Vec::new();
        let mut idx = start;
        while out.len() < request.limit as usize {
            let Some(header) = headers.get(idx) else { break };
            out.push(header.clone());
            if request.direction.is_rising() {
                idx += step;
            } else {
                let Some(next) = idx.checked_sub(step) else { break };
                idx = next;
            }
        }
        Ok(WithPeerId::new(Self::peer_id(), out))
    }
}

#[async_trait]
impl BodiesClient for TestFullClient {
    async fn get_block_bodies_with_priority(
        &self,
        hashes: Vec<H256>,
        _priority: Priority,
    ) -> PeerRequestResult<Vec<BlockBody>> {
        self.maybe_delay().await;
        let bodies = self.bodies.lock();
        Ok(WithPeerId::new(
            Self::peer_id(),
            hashes.iter().filter_map(|hash| bodies.get(hash).cloned()).collect(),
        ))
    }
}

#[async_trait]
impl ReceiptsClient for TestFullClient {
    async fn get_receipts(&self, hashes: Vec<H256>) -> PeerRequestResult<Vec<Vec<Receipt>>> {
        self.maybe_delay().await;
        let receipts = self.receipts.lock();
        let out: Vec<Vec<Receipt>> =
            hashes.iter().filter_map(|hash| receipts.get(hash).cloned()).collect();
        if out.len() != hashes.len() {
            return Err(RequestError::BadResponse)
        }
        Ok(WithPeerId::new(Self::peer_id(), out))
    }
}

#[async_trait]
impl NodeDataClient for TestFullClient {
    async fn get_node_data(&self, hashes: Vec<H256>) -> PeerRequestResult<Vec<Vec<u8>>> {
        self.maybe_delay().await;
        let state = self.state.lock();
        let Some(store) = state.as_ref() else {
            return Err(RequestError::UnsupportedCapability)
        };
        let corrupt = self.corrupt_nodes.lock();
        let out = hashes
            .iter()
            .filter_map(|hash| {
                if corrupt.contains(hash) {
                    Some(vec![0xde, 0xad, 0xbe, 0xef])
                } else {
                    store.raw(hash)
                }
            })
            .collect();
        Ok(WithPeerId::new(Self::peer_id(), out))
    }
}
