use crate::{
    consensus::{Consensus, ConsensusError},
    p2p::{
        bodies::client::BodiesClient,
        downloader::DownloadClient,
        error::{PeerRequestResult, RequestError},
        headers::client::{HeadersClient, HeadersRequest},
        priority::Priority,
    },
    provider::HeaderProvider,
};
use async_trait::async_trait;
use cairn_primitives::{
    Address, BlockBody, BlockHashOrNumber, Header, PeerId, SealedHeader, WithPeerId, H256, U256,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Consensus engine implementation for testing.
///
/// Accepts everything by default; flip [`set_fail_validation`](Self::set_fail_validation)
/// to make every check fail.
#[derive(Debug, Default)]
pub struct TestConsensus {
    fail_validation: AtomicBool,
}

impl TestConsensus {
    /// Whether validation is set up to fail.
    pub fn fail_validation(&self) -> bool {
        self.fail_validation.load(Ordering::SeqCst)
    }

    /// Make all validation calls fail (or succeed again).
    pub fn set_fail_validation(&self, val: bool) {
        self.fail_validation.store(val, Ordering::SeqCst)
    }

    fn result(&self, header: &SealedHeader) -> Result<(), ConsensusError> {
        if self.fail_validation() {
            Err(ConsensusError::InvalidSeal { hash: header.hash() })
        } else {
            Ok(())
        }
    }
}

impl Consensus for TestConsensus {
    fn validate_header_standalone(&self, header: &SealedHeader) -> Result<(), ConsensusError> {
        self.result(header)
    }

    fn validate_header(
        &self,
        header: &SealedHeader,
        _parent: &SealedHeader,
    ) -> Result<(), ConsensusError> {
        self.result(header)
    }

    fn validate_ommers(
        &self,
        header: &SealedHeader,
        _ommers: &[Header],
        _provider: &dyn HeaderProvider,
    ) -> Result<(), ConsensusError> {
        self.result(header)
    }

    fn finalize(
        &self,
        _header: &SealedHeader,
        _ommers: &[Header],
    ) -> Result<Vec<(Address, U256)>, ConsensusError> {
        Ok(Vec::new())
    }

    fn author(&self, header: &SealedHeader) -> Result<Address, ConsensusError> {
        Ok(header.beneficiary)
    }

    fn seal(&self, header: Header) -> Result<Header, ConsensusError> {
        Ok(header)
    }
}

/// A headers client that serves a canned, number-ordered set of headers.
#[derive(Debug, Default)]
pub struct TestHeadersClient {
    headers: Mutex<Vec<Header>>,
    request_attempts: AtomicU64,
    fail_requests: AtomicBool,
    bad_peers: Mutex<Vec<PeerId>>,
}

impl TestHeadersClient {
    /// Adds headers to the canned response set.
    pub fn extend(&self, headers: impl IntoIterator<Item = Header>) {
        let mut lock = self.headers.lock();
        lock.extend(headers);
        lock.sort_unstable_by_key(|h| h.number);
    }

    /// How many requests have been served so far.
    pub fn request_attempts(&self) -> u64 {
        self.request_attempts.load(Ordering::SeqCst)
    }

    /// Make every request fail with a timeout.
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst)
    }

    /// The peers reported as bad so far.
    pub fn bad_peers(&self) -> Vec<PeerId> {
        self.bad_peers.lock().clone()
    }
}

impl DownloadClient for TestHeadersClient {
    fn report_bad_message(&self, peer_id: PeerId) {
        self.bad_peers.lock().push(peer_id);
    }

    fn num_connected_peers(&self) -> usize {
        1
    }
}

#[async_trait]
impl HeadersClient for TestHeadersClient {
    async fn get_headers_with_priority(
        &self,
        request: HeadersRequest,
        _priority: Priority,
    ) -> PeerRequestResult<Vec<Header>> {
        self.request_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(RequestError::Timeout)
        }

        let headers = self.headers.lock();
        let start = match request.start {
            BlockHashOrNumber::Hash(hash) => {
                headers.iter().position(|h| h.hash_slow() == hash)
            }
            BlockHashOrNumber::Number(number) => headers.iter().position(|h| h.number == number),
        };
        let Some(start) = start else { return Ok(WithPeerId::new(PeerId::default(), Vec::new())) };

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
        Ok(WithPeerId::new(PeerId::default(), out))
    }
}

/// A bodies client backed by a hash→body map.
#[derive(Debug, Default)]
pub struct TestBodiesClient {
    bodies: Mutex<HashMap<H256, BlockBody>>,
    request_attempts: AtomicU64,
    bad_peers: Mutex<Vec<PeerId>>,
}

impl TestBodiesClient {
    /// Registers a body for the given block hash.
    pub fn insert(&self, hash: H256, body: BlockBody) {
        self.bodies.lock().insert(hash, body);
    }

    /// How many requests have been served so far.
    pub fn request_attempts(&self) -> u64 {
        self.request_attempts.load(Ordering::SeqCst)
    }

    /// The peers reported as bad so far.
    pub fn bad_peers(&self) -> Vec<PeerId> {
        self.bad_peers.lock().clone()
    }
}

impl DownloadClient for TestBodiesClient {
    fn report_bad_message(&self, peer_id: PeerId) {
        self.bad_peers.lock().push(peer_id);
    }

    fn num_connected_peers(&self) -> usize {
        1
    }
}

#[async_trait]
impl BodiesClient for TestBodiesClient {
    async fn get_block_bodies_with_priority(
        &self,
        hashes: Vec<H256>,
        _priority: Priority,
    ) -> PeerRequestResult<Vec<BlockBody>> {
        self.request_attempts.fetch_add(1, Ordering::SeqCst);
        let bodies = self.bodies.lock();
        let out =
            hashes.iter().filter_map(|hash| bodies.get(hash).cloned()).collect::<Vec<_>>();
        Ok(WithPeerId::new(PeerId::default(), out))
    }
}
