use crate::events::{CanonStateListener, CanonicalStateUpdate, ChainEvent};
use cairn_consensus::{validation, Engine};
use cairn_interfaces::{
    consensus::{Consensus, ConsensusError},
    provider::{AccountProvider, HeaderProvider, ProviderError},
};
use cairn_executor::BlockExecutor;
use cairn_primitives::{
    constants::EMPTY_ROOT, Account, Address, BlockHash, BlockNumHash, BlockNumber, ChainInfo,
    ChainSpec, Header, Receipt, SealedBlock, SealedHeader, TransactionSigned, TxHash, H256,
    U256,
};
use cairn_state::{genesis_state_root, NodeStore, State, StateError};
use cairn_storage::BlockStore;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Chain-level policy knobs.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// On equal accumulated difficulty, keep the block seen first. This is a
    /// flood-resistance heuristic, not a protocol guarantee, hence
    /// configurable.
    pub prefer_first_seen: bool,
    /// How many recent canonical states are guaranteed retrievable; older
    /// ones become eligible for pruning.
    pub recent_states_window: u64,
    /// Capacity of the event broadcast channels.
    pub event_buffer: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { prefer_first_seen: true, recent_states_window: 128, event_buffer: 256 }
    }
}

/// The single authority on the canonical chain.
///
/// Insertion, rewind and reorganization are serialized through one writer
/// lock; queries read concurrently through the underlying stores.
pub struct BlockChain {
    spec: ChainSpec,
    config: ChainConfig,
    engine: std::sync::Arc<Engine>,
    store: std::sync::Arc<BlockStore>,
    state_store: std::sync::Arc<NodeStore>,
    /// Serializes insert_chain/set_head; readers do not take it.
    write_lock: Mutex<()>,
    canon_listener: RwLock<Option<Box<dyn CanonStateListener>>>,
    events: broadcast::Sender<ChainEvent>,
    /// Recent canonical states inside the retention window, oldest first.
    recent_roots: RwLock<VecDeque<(BlockNumHash, H256)>>,
}

impl std::fmt::Debug for BlockChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockChain")
            .field("chain_id", &self.spec.chain_id)
            .field("head", &self.store.chain_info())
            .finish()
    }
}

impl BlockChain {
    /// Opens the chain over the given stores, inserting the genesis block if
    /// the store is empty.
    pub fn new(
        spec: ChainSpec,
        engine: std::sync::Arc<Engine>,
        store: std::sync::Arc<BlockStore>,
        state_store: std::sync::Arc<NodeStore>,
        config: ChainConfig,
    ) -> cairn_interfaces::Result<Self> {
        let (events, _) = broadcast::channel(config.event_buffer);
        let chain = Self {
            spec,
            config,
            engine,
            store,
            state_store,
            write_lock: Mutex::new(()),
            canon_listener: RwLock::new(None),
            events,
            recent_roots: RwLock::new(VecDeque::new()),
        };

        if chain.store.canonical_tip().is_none() {
            let root = genesis_state_root(&chain.state_store, &chain.spec.genesis.alloc)
                .map_err(state_to_provider)?;
            let genesis = SealedBlock {
                header: chain.spec.genesis_header(root).seal(),
                body: Vec::new(),
                ommers: Vec::new(),
            };
            let difficulty = genesis.header.difficulty;
            chain.store.insert_block(&genesis, Vec::new(), difficulty);
            chain.store.set_canonical(0, genesis.hash());
            chain.track_recent(genesis.header.num_hash(), root);
            info!(target: "chain", hash = ?genesis.hash(), "initialized genesis");
        }

        Ok(chain)
    }

    /// The chain spec this chain runs under.
    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    /// The consensus engine.
    pub fn engine(&self) -> &std::sync::Arc<Engine> {
        &self.engine
    }

    /// The backing state node store.
    pub fn state_store(&self) -> &std::sync::Arc<NodeStore> {
        &self.state_store
    }

    /// Registers the synchronous canonical-state listener (the pool).
    pub fn set_canon_listener(&self, listener: Box<dyn CanonStateListener>) {
        *self.canon_listener.write() = Some(listener);
    }

    /// Subscribes to chain head/side events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /* ==================== queries ==================== */

    /// The current canonical head block.
    pub fn current_block(&self) -> Option<SealedBlock> {
        let tip = self.store.canonical_tip()?;
        self.store.block(&tip.hash)
    }

    /// The current canonical head header.
    pub fn current_header(&self) -> Option<SealedHeader> {
        let tip = self.store.canonical_tip()?;
        self.store.sealed_header(&tip.hash)
    }

    /// Best hash and number.
    pub fn chain_info(&self) -> ChainInfo {
        self.store.chain_info()
    }

    /// A block by hash, canonical or not.
    pub fn block_by_hash(&self, hash: &BlockHash) -> Option<SealedBlock> {
        self.store.block(hash)
    }

    /// The canonical block at `number`.
    pub fn block_by_number(&self, number: BlockNumber) -> Option<SealedBlock> {
        self.store.canonical_hash(number).and_then(|hash| self.store.block(&hash))
    }

    /// The receipts of a block by hash.
    pub fn receipts_by_hash(&self, hash: &BlockHash) -> Option<Vec<Receipt>> {
        self.store.receipts(hash)
    }

    /// Accumulated difficulty of a block by hash.
    pub fn total_difficulty(&self, hash: &BlockHash) -> Option<U256> {
        (*self.store).total_difficulty(hash)
    }

    /// Opens a read/write state view at the given committed root.
    pub fn state_at(&self, root: H256) -> cairn_interfaces::Result<State> {
        if root != EMPTY_ROOT && !self.state_store.contains(&root) {
            return Err(ProviderError::StateRootNotFound(root).into())
        }
        Ok(State::new(std::sync::Arc::clone(&self.state_store), root))
    }

    /// Opens the state at the current canonical head.
    pub fn state_at_head(&self) -> cairn_interfaces::Result<State> {
        let header = self
            .current_header()
            .ok_or(ProviderError::CanonicalHashNotFound(0))?;
        self.state_at(header.state_root)
    }

    /// The canonical state roots inside the retention window, oldest first.
    pub fn recent_state_roots(&self) -> Vec<(BlockNumHash, H256)> {
        self.recent_roots.read().iter().copied().collect()
    }

    /* ==================== mutation ==================== */

    /// Inserts a contiguous, header-verified sequence of blocks.
    ///
    /// Returns how many leading blocks were fully inserted, and the error
    /// that stopped insertion if any. Each block is re-validated and
    /// executed before anything about it is persisted: a block either
    /// becomes fully retrievable with its receipts and weight, or leaves no
    /// trace.
    pub fn insert_chain(
        &self,
        blocks: Vec<SealedBlock>,
    ) -> (usize, cairn_interfaces::Result<()>) {
        let _guard = self.write_lock.lock();
        let mut inserted = 0usize;
        for block in blocks {
            match self.insert_block_inner(block) {
                Ok(()) => inserted += 1,
                Err(error) => {
                    warn!(target: "chain", %error, "block insertion failed");
                    return (inserted, Err(error))
                }
            }
        }
        (inserted, Ok(()))
    }

    fn insert_block_inner(&self, block: SealedBlock) -> cairn_interfaces::Result<()> {
        if (*self.store).is_known(&block.hash()) {
            // Re-announcements of known blocks are not an error, and must not
            // disturb the first-seen tie-break.
            return Ok(())
        }

        let parent = self
            .store
            .sealed_header(&block.parent_hash())
            .ok_or(ConsensusError::ParentUnknown { hash: block.parent_hash() })?;

        // Validity assumptions may have drifted since header download;
        // everything cheap is re-checked before execution.
        let pre_state = self.state_at(parent.state_root)?;
        let provider = PreStateProvider { store: &self.store, state: &pre_state };
        validation::full_validation(&block, &provider, self.engine.as_ref(), self.spec.chain_id)?;

        let parent_td = (*self.store)
            .total_difficulty(&block.parent_hash())
            .ok_or(ConsensusError::ParentUnknown { hash: block.parent_hash() })?;
        let total_difficulty = parent_td + block.header.difficulty;

        let mut state = self.state_at(parent.state_root)?;
        let executor = BlockExecutor::new(self.engine.as_ref());
        let outcome = executor.execute_and_verify(&block, &mut state)?;

        self.store.insert_block(&block, outcome.receipts, total_difficulty);

        let head = self.store.canonical_tip().unwrap_or_default();
        let head_td = (*self.store).total_difficulty(&head.hash).unwrap_or_default();

        let adopt = total_difficulty > head_td ||
            (total_difficulty == head_td && !self.config.prefer_first_seen);
        if adopt {
            self.make_canonical(block)?;
        } else {
            debug!(target: "chain", hash = ?block.hash(), number = block.number(), "side block");
            let _ = self.events.send(ChainEvent::Side { block });
        }
        Ok(())
    }

    /// Makes `block` the canonical head, reorganizing if its parent is not
    /// the current tip.
    fn make_canonical(&self, block: SealedBlock) -> cairn_interfaces::Result<()> {
        // Walk the new branch back to the first canonical ancestor.
        let mut new_segment = vec![block.clone()];
        let mut cursor = block.parent_hash();
        let ancestor_number = loop {
            if let Some(number) = self.store.canonical_number(&cursor) {
                break number
            }
            let parent = self
                .store
                .block(&cursor)
                .ok_or(ConsensusError::ParentUnknown { hash: cursor })?;
            cursor = parent.parent_hash();
            new_segment.push(parent);
        };
        new_segment.reverse();

        let abandoned = self.store.unwind_canonical_above(ancestor_number);
        for entry in &new_segment {
            self.store.set_canonical(entry.number(), entry.hash());
        }

        let mined: Vec<TxHash> = new_segment
            .iter()
            .flat_map(|b| b.body.iter().map(|tx| tx.hash()))
            .collect();

        let mut reinjected: Vec<TransactionSigned> = Vec::new();
        if !abandoned.is_empty() {
            info!(
                target: "chain",
                depth = abandoned.len(),
                ancestor = ancestor_number,
                new_head = ?block.hash(),
                "chain reorganization"
            );
            let mined_set: HashSet<TxHash> = mined.iter().copied().collect();
            for old in &abandoned {
                if let Some(old_block) = self.store.block(&old.hash) {
                    reinjected.extend(
                        old_block
                            .body
                            .iter()
                            .filter(|tx| !mined_set.contains(&tx.hash()))
                            .cloned(),
                    );
                    let _ = self.events.send(ChainEvent::Side { block: old_block });
                }
            }
        }

        self.track_recent(block.header.num_hash(), block.header.state_root);
        self.notify_canon_change(&block.header, mined, reinjected);
        let _ = self.events.send(ChainEvent::Head { block });
        Ok(())
    }

    /// Inserts a block without executing it, trusting downloaded receipts
    /// that were already verified against the header's receipts root.
    ///
    /// This is the fast-sync import path below the pivot: header and body
    /// rules are enforced, state is not derived, and the pool is not
    /// notified (it realigns once execution resumes past the pivot). The
    /// block must extend the current canonical tip.
    pub fn import_bare(
        &self,
        block: SealedBlock,
        receipts: Vec<Receipt>,
    ) -> cairn_interfaces::Result<()> {
        let _guard = self.write_lock.lock();
        if (*self.store).is_known(&block.hash()) {
            return Ok(())
        }

        let tip = self.store.canonical_tip().unwrap_or_default();
        if block.parent_hash() != tip.hash {
            return Err(cairn_interfaces::Error::Custom(
                "bare import must extend the canonical tip".to_string(),
            ))
        }
        let parent = self
            .store
            .sealed_header(&tip.hash)
            .ok_or(ConsensusError::ParentUnknown { hash: tip.hash })?;

        self.engine.validate_header_standalone(&block.header)?;
        validation::validate_block_standalone(&block)?;
        self.engine.validate_header(&block.header, &parent)?;
        self.engine.validate_ommers(&block.header, &block.ommers, &*self.store)?;

        let receipts_root =
            cairn_primitives::proofs::calculate_receipts_root(receipts.iter());
        if receipts_root != block.header.receipts_root {
            return Err(cairn_interfaces::executor::BlockExecutionError::ReceiptsRootMismatch {
                expected: block.header.receipts_root,
                got: receipts_root,
            }
            .into())
        }

        let parent_td = (*self.store)
            .total_difficulty(&tip.hash)
            .ok_or(ConsensusError::ParentUnknown { hash: tip.hash })?;
        self.store.insert_block(&block, receipts, parent_td + block.header.difficulty);
        self.store.set_canonical(block.number(), block.hash());
        let _ = self.events.send(ChainEvent::Head { block });
        Ok(())
    }

    /// Forcibly rewinds the canonical head to `number`.
    ///
    /// Blocks above stay retrievable by hash but lose canonicity; their
    /// transactions are handed back to the pool.
    pub fn set_head(&self, number: BlockNumber) -> cairn_interfaces::Result<()> {
        let _guard = self.write_lock.lock();
        let tip = self.store.canonical_tip().unwrap_or_default();
        if number >= tip.number {
            return Ok(())
        }
        let new_head_hash = self
            .store
            .canonical_hash(number)
            .ok_or(ProviderError::CanonicalHashNotFound(number))?;
        let new_head = self
            .store
            .sealed_header(&new_head_hash)
            .ok_or(ProviderError::BlockHashNotFound(new_head_hash))?;

        let removed = self.store.unwind_canonical_above(number);
        let mut reinjected = Vec::new();
        for entry in &removed {
            if let Some(block) = self.store.block(&entry.hash) {
                reinjected.extend(block.body.iter().cloned());
            }
        }
        info!(target: "chain", number, dropped = removed.len(), "set head");

        self.recent_roots.write().retain(|(num_hash, _)| num_hash.number <= number);
        self.notify_canon_change(&new_head, Vec::new(), reinjected);
        if let Some(block) = self.store.block(&new_head_hash) {
            let _ = self.events.send(ChainEvent::Head { block });
        }
        Ok(())
    }

    fn notify_canon_change(
        &self,
        new_tip: &SealedHeader,
        mined_transactions: Vec<TxHash>,
        reinjected: Vec<TransactionSigned>,
    ) {
        let listener = self.canon_listener.read();
        if let Some(listener) = listener.as_ref() {
            listener.on_canonical_state_change(CanonicalStateUpdate {
                new_tip: new_tip.clone(),
                state_root: new_tip.state_root,
                mined_transactions,
                reinjected,
            });
        }
    }

    fn track_recent(&self, num_hash: BlockNumHash, root: H256) {
        let mut recents = self.recent_roots.write();
        recents.push_back((num_hash, root));
        while recents.len() as u64 > self.config.recent_states_window {
            recents.pop_front();
        }
    }
}

impl HeaderProvider for BlockChain {
    fn header(&self, block_hash: &BlockHash) -> cairn_interfaces::Result<Option<Header>> {
        self.store.header(block_hash)
    }

    fn header_by_number(&self, num: u64) -> cairn_interfaces::Result<Option<Header>> {
        self.store.header_by_number(num)
    }

    fn total_difficulty(&self, block_hash: &BlockHash) -> cairn_interfaces::Result<Option<U256>> {
        Ok((*self.store).total_difficulty(block_hash))
    }
}

/// Provider pairing the block store with the pre-state of the block being
/// validated, for transaction nonce checks.
struct PreStateProvider<'a> {
    store: &'a BlockStore,
    state: &'a State,
}

impl HeaderProvider for PreStateProvider<'_> {
    fn header(&self, block_hash: &BlockHash) -> cairn_interfaces::Result<Option<Header>> {
        self.store.header(block_hash)
    }

    fn header_by_number(&self, num: u64) -> cairn_interfaces::Result<Option<Header>> {
        self.store.header_by_number(num)
    }

    fn total_difficulty(&self, block_hash: &BlockHash) -> cairn_interfaces::Result<Option<U256>> {
        Ok(self.store.total_difficulty(block_hash))
    }
}

impl AccountProvider for PreStateProvider<'_> {
    fn basic_account(&self, address: Address) -> cairn_interfaces::Result<Option<Account>> {
        self.state.basic_account(address).map_err(|e| state_to_provider(e).into())
    }
}

fn state_to_provider(error: StateError) -> ProviderError {
    ProviderError::Storage(error.to_string())
}
