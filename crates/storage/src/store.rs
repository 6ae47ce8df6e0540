use cairn_interfaces::provider::{AccountProvider, HeaderProvider};
use cairn_primitives::{
    Account, Address, BlockBody, BlockHash, BlockNumHash, BlockNumber, ChainInfo, Header,
    Receipt, SealedBlock, SealedHeader, U256,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Default)]
struct StoreInner {
    headers: HashMap<BlockHash, SealedHeader>,
    bodies: HashMap<BlockHash, BlockBody>,
    receipts: HashMap<BlockHash, Vec<Receipt>>,
    /// number → canonical hash. Rewritten on reorg.
    canonical: BTreeMap<BlockNumber, BlockHash>,
    /// hash → accumulated difficulty. Append-only.
    total_difficulty: HashMap<BlockHash, U256>,
}

/// Durable storage for headers, bodies, receipts and the chain indices.
///
/// All writes for one block go through [`insert_block`](BlockStore::insert_block)
/// under a single write lock, so a block is either fully recorded or absent;
/// readers never observe a header without its difficulty entry.
#[derive(Debug, Default)]
pub struct BlockStore {
    inner: RwLock<StoreInner>,
}

impl BlockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a block's header, body, receipts and accumulated difficulty.
    ///
    /// Does not touch the canonical index; fork choice decides canonicity
    /// separately.
    pub fn insert_block(
        &self,
        block: &SealedBlock,
        receipts: Vec<Receipt>,
        total_difficulty: U256,
    ) {
        let mut inner = self.inner.write();
        let hash = block.hash();
        inner.headers.insert(hash, block.header.clone());
        inner.bodies.insert(hash, block.body());
        inner.receipts.insert(hash, receipts);
        inner.total_difficulty.insert(hash, total_difficulty);
    }

    /// Whether a block with this hash has been recorded.
    pub fn is_known(&self, hash: &BlockHash) -> bool {
        self.inner.read().headers.contains_key(hash)
    }

    /// The sealed header for `hash`, if recorded.
    pub fn sealed_header(&self, hash: &BlockHash) -> Option<SealedHeader> {
        self.inner.read().headers.get(hash).cloned()
    }

    /// The block body for `hash`, if recorded.
    pub fn body(&self, hash: &BlockHash) -> Option<BlockBody> {
        self.inner.read().bodies.get(hash).cloned()
    }

    /// The receipts for `hash`, if recorded.
    pub fn receipts(&self, hash: &BlockHash) -> Option<Vec<Receipt>> {
        self.inner.read().receipts.get(hash).cloned()
    }

    /// Reassembles the full block for `hash`, if recorded.
    pub fn block(&self, hash: &BlockHash) -> Option<SealedBlock> {
        let inner = self.inner.read();
        let header = inner.headers.get(hash)?.clone();
        let body = inner.bodies.get(hash)?.clone();
        Some(SealedBlock::new(header, body))
    }

    /// The accumulated difficulty of `hash`, if recorded.
    pub fn total_difficulty(&self, hash: &BlockHash) -> Option<U256> {
        self.inner.read().total_difficulty.get(hash).copied()
    }

    /// The canonical hash at `number`, if any.
    pub fn canonical_hash(&self, number: BlockNumber) -> Option<BlockHash> {
        self.inner.read().canonical.get(&number).copied()
    }

    /// The canonical block number of `hash`, if it is canonical.
    pub fn canonical_number(&self, hash: &BlockHash) -> Option<BlockNumber> {
        let inner = self.inner.read();
        inner
            .headers
            .get(hash)
            .map(|h| h.number)
            .filter(|number| inner.canonical.get(number) == Some(hash))
    }

    /// The canonical chain tip, if any block was marked canonical yet.
    pub fn canonical_tip(&self) -> Option<BlockNumHash> {
        let inner = self.inner.read();
        inner
            .canonical
            .last_key_value()
            .map(|(&number, &hash)| BlockNumHash { number, hash })
    }

    /// Current best hash and number, zeroed if the chain is empty.
    pub fn chain_info(&self) -> ChainInfo {
        self.canonical_tip()
            .map(|tip| ChainInfo { best_hash: tip.hash, best_number: tip.number })
            .unwrap_or_default()
    }

    /// Marks `hash` canonical at `number`.
    pub fn set_canonical(&self, number: BlockNumber, hash: BlockHash) {
        self.inner.write().canonical.insert(number, hash);
    }

    /// Drops all canonical entries above `number`, returning them tip-first.
    ///
    /// The blocks themselves stay recorded; only their canonicity is
    /// revoked.
    pub fn unwind_canonical_above(&self, number: BlockNumber) -> Vec<BlockNumHash> {
        let mut inner = self.inner.write();
        let removed = inner.canonical.split_off(&(number + 1));
        let mut out: Vec<BlockNumHash> = removed
            .into_iter()
            .map(|(number, hash)| BlockNumHash { number, hash })
            .collect();
        out.reverse();
        if !out.is_empty() {
            debug!(target: "storage", above = number, count = out.len(), "unwound canonical index");
        }
        out
    }
}

impl HeaderProvider for BlockStore {
    fn header(&self, block_hash: &BlockHash) -> cairn_interfaces::Result<Option<Header>> {
        Ok(self.sealed_header(block_hash).map(|h| h.unseal()))
    }

    fn header_by_number(&self, num: u64) -> cairn_interfaces::Result<Option<Header>> {
        Ok(self
            .canonical_hash(num)
            .and_then(|hash| self.sealed_header(&hash))
            .map(|h| h.unseal()))
    }

    fn total_difficulty(&self, block_hash: &BlockHash) -> cairn_interfaces::Result<Option<U256>> {
        Ok(BlockStore::total_difficulty(self, block_hash))
    }
}

/// Stores never hold account data; the impl exists so a [`BlockStore`] can be
/// passed where a combined provider is expected in tests.
impl AccountProvider for BlockStore {
    fn basic_account(&self, _address: Address) -> cairn_interfaces::Result<Option<Account>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_interfaces::test_utils::generators::random_block_range;
    use cairn_primitives::H256;

    #[test]
    fn insert_and_reassemble_block() {
        let store = BlockStore::new();
        let blocks = random_block_range(1..4, H256::zero());
        for (i, block) in blocks.iter().enumerate() {
            store.insert_block(block, Vec::new(), U256::from(i as u64 + 1));
            store.set_canonical(block.number(), block.hash());
        }

        let restored = store.block(&blocks[1].hash()).unwrap();
        assert_eq!(restored, blocks[1]);
        assert_eq!(store.chain_info().best_number, 3);
        assert_eq!(store.canonical_number(&blocks[2].hash()), Some(3));
    }

    #[test]
    fn unwind_revokes_canonicity_but_keeps_blocks() {
        let store = BlockStore::new();
        let blocks = random_block_range(1..5, H256::zero());
        for block in blocks.iter() {
            store.insert_block(block, Vec::new(), U256::one());
            store.set_canonical(block.number(), block.hash());
        }

        let removed = store.unwind_canonical_above(2);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].number, 4);
        assert_eq!(store.chain_info().best_number, 2);
        assert!(store.is_known(&blocks[3].hash()));
        assert_eq!(store.canonical_number(&blocks[3].hash()), None);
    }
}
