use crate::{
    messages::{GetHeaders, Message},
    peer::ReputationChangeKind,
    set::PeerSet,
};
use async_trait::async_trait;
use cairn_interfaces::p2p::{
    bodies::client::BodiesClient,
    downloader::DownloadClient,
    error::{PeerRequestResult, RequestError, RequestResult, ResponseValidator},
    headers::client::{HeadersClient, HeadersRequest},
    node_data::NodeDataClient,
    priority::Priority,
    receipts::ReceiptsClient,
};
use cairn_primitives::{BlockBody, Header, HeadersDirection, PeerId, Receipt, WithPeerId, H256};
use parking_lot::RwLock;
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Transport handle to one connected peer's session.
///
/// Implementations pair each request with exactly one response or error;
/// the distributor never has more than one logical exchange per call.
#[async_trait]
pub trait PeerTransport: Send + Sync + fmt::Debug {
    /// Sends the request and awaits the peer's answer.
    async fn request(&self, message: Message) -> Result<Message, RequestError>;
}

/// Multiplexes outstanding data requests across the peer set.
///
/// Each dispatch picks the least-busy untried peer, applies the configured
/// deadline, penalizes timeouts and malformed answers, and retries against
/// a different peer up to the attempt bound.
#[derive(Debug)]
pub struct PeerDistributor {
    set: Arc<PeerSet>,
    transports: RwLock<HashMap<PeerId, Arc<dyn PeerTransport>>>,
    request_timeout: Duration,
    max_attempts: usize,
}

impl PeerDistributor {
    /// Creates a distributor over the given peer set.
    pub fn new(set: Arc<PeerSet>, request_timeout: Duration, max_attempts: usize) -> Self {
        Self {
            set,
            transports: RwLock::new(HashMap::new()),
            request_timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The underlying peer set.
    pub fn peer_set(&self) -> &Arc<PeerSet> {
        &self.set
    }

    /// Attaches the transport for a registered peer.
    pub fn attach_transport(&self, id: PeerId, transport: Arc<dyn PeerTransport>) {
        self.transports.write().insert(id, transport);
    }

    /// Detaches a peer's transport on disconnect.
    pub fn detach_transport(&self, id: &PeerId) {
        self.transports.write().remove(id);
    }

    fn pick_peer(&self, tried: &[PeerId]) -> Option<(PeerId, Arc<dyn PeerTransport>)> {
        let transports = self.transports.read();
        let mut candidates: Vec<_> = self
            .set
            .peers()
            .into_iter()
            .filter(|peer| !tried.contains(&peer.id) && transports.contains_key(&peer.id))
            .collect();
        // Least busy first; advertised weight breaks ties so the most useful
        // peer is probed before stragglers.
        candidates.sort_by_key(|peer| (peer.inflight, std::cmp::Reverse(peer.head_td)));
        let peer = candidates.first()?;
        Some((peer.id, Arc::clone(&transports[&peer.id])))
    }

    /// Sends `request` to the best available peer, retrying elsewhere on
    /// failure.
    pub async fn dispatch(&self, request: Message) -> PeerRequestResult<Message> {
        let mut tried = Vec::new();
        let mut last_error = RequestError::NoPeersAvailable;

        for attempt in 0..self.max_attempts {
            let Some((peer, transport)) = self.pick_peer(&tried) else { break };
            tried.push(peer);
            trace!(target: "peers", ?peer, attempt, "dispatching request");

            self.set.begin_request(&peer);
            let outcome = timeout(self.request_timeout, transport.request(request.clone())).await;
            self.set.end_request(&peer);

            match outcome {
                Err(_elapsed) => {
                    debug!(target: "peers", ?peer, "request deadline exceeded");
                    self.set.report(&peer, ReputationChangeKind::Timeout);
                    last_error = RequestError::Timeout;
                }
                Ok(Err(error)) => {
                    last_error = error;
                }
                Ok(Ok(response)) => {
                    if !response.answers(&request) {
                        self.set.report(&peer, ReputationChangeKind::BadMessage);
                        last_error = RequestError::BadResponse;
                        continue
                    }
                    return Ok(WithPeerId::new(peer, response))
                }
            }
        }
        Err(last_error)
    }
}

impl DownloadClient for PeerDistributor {
    fn report_bad_message(&self, peer_id: PeerId) {
        self.set.report(&peer_id, ReputationChangeKind::BadMessage);
    }

    fn num_connected_peers(&self) -> usize {
        self.set.len()
    }
}

#[async_trait]
impl HeadersClient for PeerDistributor {
    async fn get_headers_with_priority(
        &self,
        request: HeadersRequest,
        _priority: Priority,
    ) -> PeerRequestResult<Vec<Header>> {
        let message = Message::GetHeaders(GetHeaders {
            start: request.start,
            limit: request.limit,
            skip: request.skip,
            reverse: matches!(request.direction, HeadersDirection::Falling),
        });
        let (peer, response) = self.dispatch(message).await?.split();

        let result: RequestResult<Vec<Header>> = match response {
            Message::Headers(headers) => Ok(headers),
            _ => Err(RequestError::BadResponse),
        };
        if result.is_likely_bad_headers_response(&request) {
            self.set.report(&peer, ReputationChangeKind::BadHeader);
            return Err(RequestError::BadResponse)
        }
        Ok(WithPeerId::new(peer, result?))
    }
}

#[async_trait]
impl BodiesClient for PeerDistributor {
    async fn get_block_bodies_with_priority(
        &self,
        hashes: Vec<H256>,
        _priority: Priority,
    ) -> PeerRequestResult<Vec<BlockBody>> {
        let requested = hashes.len();
        let (peer, response) = self.dispatch(Message::GetBodies(hashes)).await?.split();
        match response {
            Message::Bodies(bodies) if bodies.len() <= requested => {
                Ok(WithPeerId::new(peer, bodies))
            }
            _ => {
                self.set.report(&peer, ReputationChangeKind::BadBody);
                Err(RequestError::BadResponse)
            }
        }
    }
}

#[async_trait]
impl ReceiptsClient for PeerDistributor {
    async fn get_receipts(&self, hashes: Vec<H256>) -> PeerRequestResult<Vec<Vec<Receipt>>> {
        let requested = hashes.len();
        let (peer, response) = self.dispatch(Message::GetReceipts(hashes)).await?.split();
        match response {
            Message::Receipts(receipts) if receipts.len() <= requested => {
                Ok(WithPeerId::new(peer, receipts))
            }
            _ => {
                self.set.report(&peer, ReputationChangeKind::BadMessage);
                Err(RequestError::BadResponse)
            }
        }
    }
}

#[async_trait]
impl NodeDataClient for PeerDistributor {
    async fn get_node_data(&self, hashes: Vec<H256>) -> PeerRequestResult<Vec<Vec<u8>>> {
        let requested = hashes.len();
        let (peer, response) = self.dispatch(Message::GetNodeData(hashes)).await?.split();
        match response {
            Message::NodeData(nodes) if nodes.len() <= requested => {
                Ok(WithPeerId::new(peer, nodes))
            }
            _ => {
                self.set.report(&peer, ReputationChangeKind::BadMessage);
                Err(RequestError::BadResponse)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cairn_primitives::{BlockHashOrNumber, U256};

    fn id(byte: u8) -> PeerId {
        PeerId::repeat_byte(byte)
    }

    #[derive(Debug)]
    enum Behavior {
        Respond(Message),
        Fail(RequestError),
        Hang,
    }

    #[derive(Debug)]
    struct MockTransport(Behavior);

    #[async_trait]
    impl PeerTransport for MockTransport {
        async fn request(&self, _message: Message) -> Result<Message, RequestError> {
            match &self.0 {
                Behavior::Respond(message) => Ok(message.clone()),
                Behavior::Fail(error) => Err(error.clone()),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    fn distributor() -> PeerDistributor {
        PeerDistributor::new(Arc::new(PeerSet::new()), Duration::from_millis(100), 3)
    }

    fn add_peer(distributor: &PeerDistributor, byte: u8, behavior: Behavior) {
        distributor
            .peer_set()
            .register(id(byte), 1, H256::zero(), U256::from(byte as u64))
            .unwrap();
        distributor.attach_transport(id(byte), Arc::new(MockTransport(behavior)));
    }

    fn headers_request(start: u64) -> HeadersRequest {
        HeadersRequest {
            start: BlockHashOrNumber::Number(start),
            limit: 2,
            skip: 0,
            direction: HeadersDirection::Rising,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_penalizes_and_retries_elsewhere() {
        let distributor = distributor();
        // The hanging peer advertises the heavier head, so it is tried first.
        add_peer(&distributor, 9, Behavior::Hang);
        let good = vec![Header { number: 5, ..Default::default() }];
        add_peer(&distributor, 2, Behavior::Respond(Message::Headers(good.clone())));

        let result = distributor.get_headers(headers_request(5)).await.unwrap();
        assert_eq!(result.into_data(), good);

        let set = distributor.peer_set();
        assert_eq!(set.peer(&id(9)).unwrap().score, ReputationChangeKind::Timeout.weight());
        assert_eq!(set.peer(&id(2)).unwrap().score, 0);
    }

    #[tokio::test]
    async fn mismatched_response_kind_is_penalized() {
        let distributor = distributor();
        add_peer(&distributor, 1, Behavior::Respond(Message::Bodies(vec![])));

        let result = distributor.get_headers(headers_request(0)).await;
        assert_matches!(result, Err(RequestError::BadResponse));
        assert_eq!(
            distributor.peer_set().peer(&id(1)).unwrap().score,
            ReputationChangeKind::BadMessage.weight()
        );
    }

    #[tokio::test]
    async fn response_range_is_validated_against_request() {
        let distributor = distributor();
        // Peer answers with a header at the wrong start block.
        let wrong = vec![Header { number: 9, ..Default::default() }];
        add_peer(&distributor, 1, Behavior::Respond(Message::Headers(wrong)));

        let result = distributor.get_headers(headers_request(5)).await;
        assert_matches!(result, Err(RequestError::BadResponse));
        assert!(distributor.peer_set().peer(&id(1)).unwrap().score < 0);
    }

    #[tokio::test]
    async fn no_peers_is_reported() {
        let distributor = distributor();
        let result = distributor.get_headers(headers_request(0)).await;
        assert_matches!(result, Err(RequestError::NoPeersAvailable));
    }

    #[tokio::test]
    async fn transport_errors_surface_after_retries() {
        let distributor = distributor();
        add_peer(&distributor, 1, Behavior::Fail(RequestError::ConnectionDropped));

        let result = distributor.get_headers(headers_request(0)).await;
        assert_matches!(result, Err(RequestError::ConnectionDropped));
    }
}
