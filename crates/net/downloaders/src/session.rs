use crate::{
    ancestor::find_common_ancestor,
    bodies::ConcurrentBodiesDownloaderBuilder,
    headers::ReverseHeadersDownloaderBuilder,
    receipts::ReceiptsDownloader,
    state_sync::StateSync,
};
use cairn_chain::BlockChain;
use cairn_interfaces::p2p::{
    bodies::client::BodiesClient,
    downloader::DownloadClient,
    error::DownloadError,
    headers::{client::HeadersClient, downloader::HeaderDownloader},
    node_data::NodeDataClient,
    receipts::ReceiptsClient,
};
use cairn_primitives::{BlockNumHash, ChainInfo, PeerId, SealedBlock, SealedHeader, U256};
use futures_util::StreamExt;
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How much of the chain is downloaded versus executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Execute every block from the common ancestor.
    Full,
    /// Import headers, bodies and receipts up to a pivot, pull the pivot
    /// state directly, execute only the blocks after it.
    Fast,
}

/// The phase a sync session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// No session running.
    Idle,
    /// Searching for the fork point with the peer.
    FindingAncestor,
    /// Streaming headers from the peer's tip.
    FetchingHeaders,
    /// Filling bodies (and receipts) for the header range.
    FetchingBodies,
    /// Handing verified blocks to the chain.
    Importing,
    /// The session was cancelled externally.
    Cancelled,
    /// The session failed; the node keeps serving its current chain.
    Failed,
}

/// Ways a sync session can end without reaching the target.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Not even genesis is shared with the peer.
    #[error("no common ancestor with peer, incompatible networks")]
    NoCommonAncestor,
    /// The session was cancelled externally.
    #[error("sync cancelled")]
    Cancelled,
    /// A download failed permanently.
    #[error(transparent)]
    Download(#[from] DownloadError),
    /// The chain rejected downloaded data.
    #[error(transparent)]
    Chain(#[from] cairn_interfaces::Error),
}

/// The result of a completed sync session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Blocks imported by this session.
    pub imported: usize,
    /// The canonical head after the session.
    pub head: ChainInfo,
}

/// Sync tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Headers per request while streaming the range.
    pub header_batch: u64,
    /// Bounds for the adaptive bodies batch.
    pub body_batch_min: usize,
    /// See [`Self::body_batch_min`].
    pub body_batch_max: usize,
    /// Concurrent body batch requests.
    pub body_concurrency: usize,
    /// Receipts per request in fast sync.
    pub receipts_batch: usize,
    /// State nodes per request in fast sync.
    pub state_batch: usize,
    /// Blocks handed to the chain per import step.
    pub commit_chunk: usize,
    /// Retries per request before a download fails.
    pub request_retries: usize,
    /// How far below the peer's head the fast-sync pivot sits.
    pub pivot_distance: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            header_batch: 192,
            body_batch_min: 16,
            body_batch_max: 256,
            body_concurrency: 4,
            receipts_batch: 256,
            state_batch: 384,
            commit_chunk: 1024,
            request_retries: 5,
            pivot_distance: 64,
        }
    }
}

/// Externally observable sync counters, injected at construction.
#[derive(Debug, Default)]
pub struct DownloaderStats {
    /// Headers fetched and validated.
    pub headers_fetched: AtomicU64,
    /// Bodies fetched and validated.
    pub bodies_fetched: AtomicU64,
    /// Receipt lists fetched and validated.
    pub receipts_fetched: AtomicU64,
    /// State trie nodes fetched and verified.
    pub state_nodes_fetched: AtomicU64,
    /// Blocks imported into the chain.
    pub blocks_imported: AtomicU64,
    /// Sessions that ended in failure.
    pub sessions_failed: AtomicU64,
}

/// One sync session against one peer's advertised chain.
///
/// Drives ancestor search → header streaming → body/receipt fill → import,
/// feeding the canonical chain in order. All concurrent work lives in
/// futures owned by [`run`](Self::run), so a cancellation is fully observed
/// before `run` returns: nothing keeps downloading into a cancelled
/// session, and no partially verified segment is committed.
#[derive(Debug)]
pub struct SyncSession<C> {
    chain: Arc<BlockChain>,
    client: Arc<C>,
    mode: SyncMode,
    config: SyncConfig,
    stats: Arc<DownloaderStats>,
    stage: RwLock<SyncStage>,
    cancel: watch::Sender<bool>,
}

impl<C> SyncSession<C>
where
    C: HeadersClient + BodiesClient + ReceiptsClient + NodeDataClient + 'static,
{
    /// Creates a session over the chain and a peer client.
    pub fn new(
        chain: Arc<BlockChain>,
        client: Arc<C>,
        mode: SyncMode,
        config: SyncConfig,
        stats: Arc<DownloaderStats>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self { chain, client, mode, config, stats, stage: RwLock::new(SyncStage::Idle), cancel }
    }

    /// The current session phase.
    pub fn stage(&self) -> SyncStage {
        *self.stage.read()
    }

    /// Aborts the running session. All in-flight work is torn down before
    /// [`run`](Self::run) returns.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    fn set_stage(&self, stage: SyncStage) {
        *self.stage.write() = stage;
    }

    /// Runs a sync towards the peer's advertised head.
    ///
    /// Returns without work if the peer's claimed weight does not exceed the
    /// local head's. On failure the offering peer is penalized and the local
    /// chain is left at the last fully imported block.
    pub async fn run(
        &self,
        peer: PeerId,
        peer_head: BlockNumHash,
        peer_td: U256,
    ) -> Result<SyncOutcome, SyncError> {
        let local = self.chain.chain_info();
        let local_td = self.chain.total_difficulty(&local.best_hash).unwrap_or_default();
        if peer_td <= local_td {
            debug!(target: "sync", "peer not ahead, nothing to do");
            return Ok(SyncOutcome { imported: 0, head: local })
        }

        self.cancel.send_replace(false);
        let mut cancel_rx = self.cancel.subscribe();

        info!(
            target: "sync",
            peer = ?peer,
            target_number = peer_head.number,
            "starting sync session"
        );
        let result = self.run_inner(&mut cancel_rx, peer_head).await;
        match &result {
            Ok(outcome) => {
                info!(target: "sync", imported = outcome.imported, "sync session complete");
                self.set_stage(SyncStage::Idle);
            }
            Err(SyncError::Cancelled) => {
                info!(target: "sync", "sync session cancelled");
                self.set_stage(SyncStage::Cancelled);
            }
            Err(error) => {
                warn!(target: "sync", %error, "sync session failed");
                self.stats.sessions_failed.fetch_add(1, Ordering::Relaxed);
                self.client.report_bad_message(peer);
                self.set_stage(SyncStage::Failed);
            }
        }
        result
    }

    async fn run_inner(
        &self,
        cancel: &mut watch::Receiver<bool>,
        peer_head: BlockNumHash,
    ) -> Result<SyncOutcome, SyncError> {
        self.set_stage(SyncStage::FindingAncestor);
        let ancestor = self
            .with_cancel(cancel, find_common_ancestor(&self.client, &self.chain, peer_head.number))
            .await??;

        self.set_stage(SyncStage::FetchingHeaders);
        let headers = self.fetch_headers(cancel, &ancestor, peer_head).await?;
        if headers.is_empty() {
            return Ok(SyncOutcome { imported: 0, head: self.chain.chain_info() })
        }
        self.stats.headers_fetched.fetch_add(headers.len() as u64, Ordering::Relaxed);

        let pivot = match self.mode {
            SyncMode::Full => None,
            SyncMode::Fast => {
                let target = peer_head.number.saturating_sub(self.config.pivot_distance);
                (target > ancestor.number).then_some(target)
            }
        };

        let bodies = ConcurrentBodiesDownloaderBuilder::default()
            .batch_bounds(self.config.body_batch_min, self.config.body_batch_max)
            .concurrency(self.config.body_concurrency)
            .retries(self.config.request_retries)
            .build(Arc::clone(&self.client));

        let mut imported = 0usize;
        for chunk in headers.chunks(self.config.commit_chunk) {
            self.set_stage(SyncStage::FetchingBodies);
            let blocks =
                self.with_cancel(cancel, bodies.download(chunk.to_vec())).await??;
            self.stats.bodies_fetched.fetch_add(blocks.len() as u64, Ordering::Relaxed);

            self.set_stage(SyncStage::Importing);
            imported += self.import_blocks(cancel, blocks, pivot).await?;
            self.stats.blocks_imported.store(imported as u64, Ordering::Relaxed);
        }

        Ok(SyncOutcome { imported, head: self.chain.chain_info() })
    }

    /// Streams the header range tip → ancestor and returns it oldest first.
    async fn fetch_headers(
        &self,
        cancel: &mut watch::Receiver<bool>,
        ancestor: &BlockNumHash,
        peer_head: BlockNumHash,
    ) -> Result<Vec<SealedHeader>, SyncError> {
        let head = self
            .chain
            .block_by_hash(&ancestor.hash)
            .map(|block| block.header)
            .ok_or(SyncError::NoCommonAncestor)?;
        if head.hash() == peer_head.hash {
            return Ok(Vec::new())
        }

        let downloader = ReverseHeadersDownloaderBuilder::default()
            .batch_size(self.config.header_batch)
            .retries(self.config.request_retries)
            .build(Arc::clone(self.chain.engine()), Arc::clone(&self.client));

        let mut stream = downloader.stream(head, peer_head.hash);
        let mut headers = Vec::new();
        loop {
            let item = self.with_cancel(cancel, stream.next()).await?;
            match item {
                Some(Ok(header)) => headers.push(header),
                Some(Err(error)) => return Err(error.into()),
                None => break,
            }
        }
        drop(stream);
        // The stream walks tip-first; imports go oldest-first.
        headers.reverse();
        Ok(headers)
    }

    /// Imports one ordered chunk, splitting around the fast-sync pivot.
    async fn import_blocks(
        &self,
        cancel: &mut watch::Receiver<bool>,
        blocks: Vec<SealedBlock>,
        pivot: Option<u64>,
    ) -> Result<usize, SyncError> {
        let Some(pivot) = pivot else {
            return self.execute_blocks(blocks)
        };

        let split = blocks.partition_point(|block| block.number() <= pivot);
        let (bare, executed) = blocks.split_at(split);

        let mut imported = 0usize;
        if !bare.is_empty() {
            let headers: Vec<SealedHeader> = bare.iter().map(|b| b.header.clone()).collect();
            let receipts = ReceiptsDownloader::new(
                Arc::clone(&self.client),
                self.config.receipts_batch,
                self.config.request_retries,
            );
            let lists = self.with_cancel(cancel, receipts.download(&headers)).await??;
            self.stats.receipts_fetched.fetch_add(lists.len() as u64, Ordering::Relaxed);

            let reached_pivot = bare.last().map(|b| b.number() == pivot).unwrap_or(false);
            let pivot_root = bare.last().map(|b| b.header.state_root);
            for (block, receipts) in bare.iter().cloned().zip(lists) {
                self.chain.import_bare(block, receipts)?;
                imported += 1;
            }

            if reached_pivot {
                // The pivot's state is pulled directly; execution takes over
                // from here.
                if let Some(root) = pivot_root {
                    let sync = StateSync::new(
                        Arc::clone(&self.client),
                        Arc::clone(self.chain.state_store()),
                        self.config.state_batch,
                        self.config.request_retries,
                    );
                    let fetched = self.with_cancel(cancel, sync.run(root)).await??;
                    self.stats
                        .state_nodes_fetched
                        .fetch_add(fetched as u64, Ordering::Relaxed);
                }
            }
        }

        imported += self.execute_blocks(executed.to_vec())?;
        Ok(imported)
    }

    fn execute_blocks(&self, blocks: Vec<SealedBlock>) -> Result<usize, SyncError> {
        if blocks.is_empty() {
            return Ok(0)
        }
        let (imported, result) = self.chain.insert_chain(blocks);
        result?;
        Ok(imported)
    }

    /// Awaits `fut` unless the session gets cancelled first.
    async fn with_cancel<F: std::future::Future>(
        &self,
        cancel: &mut watch::Receiver<bool>,
        fut: F,
    ) -> Result<F::Output, SyncError> {
        tokio::pin!(fut);
        loop {
            if *cancel.borrow() {
                return Err(SyncError::Cancelled)
            }
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return Err(SyncError::Cancelled)
                    }
                }
                output = &mut fut => return Ok(output),
            }
        }
    }
}

impl<C: Send + Sync> cairn_interfaces::sync::SyncStateProvider for SyncSession<C> {
    fn is_syncing(&self) -> bool {
        matches!(
            *self.stage.read(),
            SyncStage::FindingAncestor |
                SyncStage::FetchingHeaders |
                SyncStage::FetchingBodies |
                SyncStage::Importing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFullClient;
    use assert_matches::assert_matches;
    use cairn_chain::{test_utils::build_block, ChainConfig};
    use cairn_consensus::{Engine, PoaEngine, NONCE_DROP};
    use cairn_interfaces::consensus::ConsensusError;
    use cairn_primitives::{
        proofs, Address, ChainSpec, GenesisAccount, Header, Transaction, TransactionKind,
        TransactionSigned,
    };
    use cairn_state::NodeStore;
    use cairn_storage::BlockStore;
    use secp256k1::SecretKey;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn address(byte: u8) -> Address {
        TransactionSigned::sign(Transaction::default(), &key(byte))
            .unwrap()
            .recover_signer()
            .unwrap()
    }

    const SIGNER: u8 = 0x51;
    const SENDER: u8 = 0xaa;
    const FUNDS: u64 = 1_000_000_000_000;

    fn spec() -> ChainSpec {
        let mut spec = ChainSpec::dev_poa(vec![address(SIGNER)]);
        spec.genesis.alloc.push(GenesisAccount {
            address: address(SENDER),
            balance: U256::from(FUNDS),
        });
        spec
    }

    fn make_chain() -> Arc<BlockChain> {
        let spec = spec();
        let engine = Arc::new(Engine::from_spec(&spec));
        if let Engine::ProofOfAuthority(poa) = engine.as_ref() {
            poa.set_signer(key(SIGNER));
        }
        Arc::new(
            BlockChain::new(
                spec,
                engine,
                Arc::new(BlockStore::new()),
                Arc::new(NodeStore::new()),
                ChainConfig::default(),
            )
            .unwrap(),
        )
    }

    fn transfer(nonce: u64) -> TransactionSigned {
        let tx = Transaction {
            chain_id: 1337,
            nonce,
            gas_price: 1,
            gas_limit: 21_000,
            to: TransactionKind::Call(Address::repeat_byte(0x77)),
            value: U256::from(10u64),
            input: Default::default(),
        };
        TransactionSigned::sign(tx, &key(SENDER)).unwrap()
    }

    /// Extends the chain by `count` sealed blocks, a transfer in every other
    /// one.
    fn extend(chain: &Arc<BlockChain>, count: usize) -> Vec<SealedBlock> {
        let mut parent = chain.current_header().unwrap();
        let mut nonce = 0u64;
        let mut blocks = Vec::with_capacity(count);
        for i in 0..count {
            let body = if i % 2 == 0 {
                let tx = transfer(nonce);
                nonce += 1;
                vec![tx]
            } else {
                Vec::new()
            };
            let block = build_block(chain, &parent, body, U256::from(2u64), Address::zero());
            let (n, result) = chain.insert_chain(vec![block.clone()]);
            result.unwrap();
            assert_eq!(n, 1);
            parent = block.header.clone();
            blocks.push(block);
        }
        blocks
    }

    fn client_for(chain: &Arc<BlockChain>, blocks: &[SealedBlock]) -> Arc<TestFullClient> {
        let client = Arc::new(TestFullClient::default());
        let genesis = chain.block_by_number(0).unwrap();
        client.add_blocks(std::iter::once(&genesis).chain(blocks.iter()));
        client
    }

    fn head_of(chain: &Arc<BlockChain>) -> (BlockNumHash, U256) {
        let info = chain.chain_info();
        let td = chain.total_difficulty(&info.best_hash).unwrap();
        (BlockNumHash { number: info.best_number, hash: info.best_hash }, td)
    }

    fn make_session(
        chain: Arc<BlockChain>,
        client: Arc<TestFullClient>,
        mode: SyncMode,
    ) -> SyncSession<TestFullClient> {
        let config = SyncConfig {
            commit_chunk: 4,
            pivot_distance: 4,
            request_retries: 3,
            ..Default::default()
        };
        SyncSession::new(chain, client, mode, config, Arc::new(DownloaderStats::default()))
    }

    #[tokio::test]
    async fn full_sync_follows_honest_peer() {
        let remote = make_chain();
        let blocks = extend(&remote, 9);
        let client = client_for(&remote, &blocks);

        let local = make_chain();
        let session = make_session(Arc::clone(&local), client, SyncMode::Full);
        let (peer_head, peer_td) = head_of(&remote);

        let outcome =
            session.run(TestFullClient::peer_id(), peer_head, peer_td).await.unwrap();
        assert_eq!(outcome.imported, 9);
        assert_eq!(local.chain_info(), remote.chain_info());
        assert_eq!(session.stage(), SyncStage::Idle);

        // State arrived bit-for-bit: the recipient holds every transfer.
        let state = local.state_at_head().unwrap();
        let recipient = state
            .basic_account(Address::repeat_byte(0x77))
            .unwrap()
            .unwrap();
        assert_eq!(recipient.balance, U256::from(50u64), "five transfers of ten");
    }

    #[tokio::test]
    async fn sync_resumes_from_common_ancestor() {
        let remote = make_chain();
        let blocks = extend(&remote, 9);
        let client = client_for(&remote, &blocks);

        // Local already imported the first four blocks.
        let local = make_chain();
        let (n, result) = local.insert_chain(blocks[..4].to_vec());
        result.unwrap();
        assert_eq!(n, 4);

        let session = make_session(Arc::clone(&local), client, SyncMode::Full);
        let (peer_head, peer_td) = head_of(&remote);
        let outcome =
            session.run(TestFullClient::peer_id(), peer_head, peer_td).await.unwrap();
        assert_eq!(outcome.imported, 5, "only the missing suffix is fetched");
        assert_eq!(local.chain_info(), remote.chain_info());
    }

    #[tokio::test]
    async fn peer_without_heavier_chain_is_ignored() {
        let remote = make_chain();
        let _ = extend(&remote, 2);
        let local = make_chain();
        let blocks = extend(&local, 3);
        let _ = blocks;

        let client = client_for(&remote, &[]);
        let session = make_session(Arc::clone(&local), client, SyncMode::Full);
        let (peer_head, peer_td) = head_of(&remote);
        let outcome =
            session.run(TestFullClient::peer_id(), peer_head, peer_td).await.unwrap();
        assert_eq!(outcome.imported, 0);
        assert_eq!(local.chain_info().best_number, 3);
    }

    /// Blocks re-signed by an unauthorized key, linked onto an honest
    /// prefix.
    fn forged_suffix(
        honest: &[SealedBlock],
        from: usize,
        attacker: &SecretKey,
    ) -> Vec<SealedBlock> {
        let mut parent = honest[from - 1].header.clone();
        let mut forged = Vec::new();
        for original in &honest[from..] {
            let header = Header {
                parent_hash: parent.hash(),
                ommers_hash: proofs::calculate_ommers_root(std::iter::empty()),
                beneficiary: Address::zero(),
                state_root: parent.state_root,
                transactions_root: proofs::calculate_transaction_root(std::iter::empty()),
                receipts_root: proofs::calculate_receipts_root(std::iter::empty()),
                difficulty: U256::from(2u64),
                number: original.number(),
                gas_limit: parent.gas_limit,
                gas_used: 0,
                timestamp: parent.timestamp + 10,
                extra_data: Default::default(),
                mix_hash: Default::default(),
                nonce: NONCE_DROP,
            };
            let sealed = PoaEngine::sign_header(header, attacker).unwrap().seal();
            parent = sealed.clone();
            forged.push(SealedBlock {
                header: sealed,
                body: Vec::new(),
                ommers: Vec::new(),
            });
        }
        forged
    }

    #[tokio::test]
    async fn dishonest_peer_cannot_corrupt_the_chain() {
        let remote = make_chain();
        let honest = extend(&remote, 8);

        // A peer serving the honest chain up to block 4, then its own forged
        // blocks signed by an unauthorized key.
        let forged = forged_suffix(&honest, 4, &key(0x66));
        let dishonest_client = Arc::new(TestFullClient::default());
        let genesis = remote.block_by_number(0).unwrap();
        dishonest_client.add_blocks(
            std::iter::once(&genesis).chain(honest[..4].iter()).chain(forged.iter()),
        );

        let local = make_chain();
        let session = make_session(Arc::clone(&local), Arc::clone(&dishonest_client), SyncMode::Full);
        let forged_tip = forged.last().unwrap();
        let peer_head =
            BlockNumHash { number: forged_tip.number(), hash: forged_tip.hash() };
        let peer_td = remote.total_difficulty(&honest.last().unwrap().hash()).unwrap();

        let result = session
            .run(TestFullClient::peer_id(), peer_head, peer_td)
            .await;
        assert_matches!(
            result,
            Err(SyncError::Chain(cairn_interfaces::Error::Consensus(
                ConsensusError::UnknownAuthority { .. }
            )))
        );
        assert_eq!(session.stage(), SyncStage::Failed);
        assert!(!dishonest_client.bad_peers().is_empty());

        // The valid prefix survived; nothing forged became canonical.
        assert_eq!(local.chain_info().best_number, 4);
        assert_eq!(local.chain_info().best_hash, honest[3].hash());
        for block in &forged {
            assert!(local.block_by_hash(&block.hash()).is_none());
        }

        // A session against an honest peer completes from there.
        let honest_client = client_for(&remote, &honest);
        let session = make_session(Arc::clone(&local), honest_client, SyncMode::Full);
        let (peer_head, peer_td) = head_of(&remote);
        let outcome =
            session.run(TestFullClient::peer_id(), peer_head, peer_td).await.unwrap();
        assert_eq!(outcome.imported, 4);
        assert_eq!(local.chain_info(), remote.chain_info());
    }

    #[tokio::test]
    async fn cancellation_discards_unimported_work() {
        let remote = make_chain();
        let blocks = extend(&remote, 5);
        let client = client_for(&remote, &blocks);
        client.set_delay(std::time::Duration::from_secs(5));

        let local = make_chain();
        let session = Arc::new(make_session(Arc::clone(&local), client, SyncMode::Full));
        let (peer_head, peer_td) = head_of(&remote);

        let runner = Arc::clone(&session);
        let handle = tokio::spawn(async move {
            runner.run(TestFullClient::peer_id(), peer_head, peer_td).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        session.cancel();

        let result = handle.await.unwrap();
        assert_matches!(result, Err(SyncError::Cancelled));
        assert_eq!(session.stage(), SyncStage::Cancelled);
        assert_eq!(local.chain_info().best_number, 0, "nothing was partially applied");
    }

    #[tokio::test]
    async fn fast_sync_pulls_receipts_and_pivot_state() {
        let remote = make_chain();
        let blocks = extend(&remote, 12);
        let client = client_for(&remote, &blocks);
        for block in &blocks {
            client.insert_receipts(block.hash(), remote.receipts_by_hash(&block.hash()).unwrap());
        }
        client.serve_state(remote.state_store());

        let local = make_chain();
        let session = make_session(Arc::clone(&local), client, SyncMode::Fast);
        let (peer_head, peer_td) = head_of(&remote);
        let outcome =
            session.run(TestFullClient::peer_id(), peer_head, peer_td).await.unwrap();

        assert_eq!(outcome.imported, 12);
        assert_eq!(local.chain_info(), remote.chain_info());

        // A pre-pivot block carries its downloaded receipts.
        let early = &blocks[2];
        assert_eq!(
            local.receipts_by_hash(&early.hash()),
            remote.receipts_by_hash(&early.hash())
        );

        // The pivot state arrived verified; head state answers queries.
        let state = local.state_at_head().unwrap();
        let remote_state = remote.state_at_head().unwrap();
        assert_eq!(
            state.basic_account(address(SENDER)).unwrap(),
            remote_state.basic_account(address(SENDER)).unwrap()
        );
    }
}
