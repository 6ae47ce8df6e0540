use crate::{
    journal::Journal, ordering::TransactionOrdering, validate::TransactionValidator,
    GasPriceOrdering, PoolConfig, PoolError, PoolResult,
};
use cairn_interfaces::events::{CanonStateListener, CanonicalStateUpdate};
use cairn_primitives::{
    Account, Address, SealedHeader, TransactionSigned, TxHash,
};
use cairn_state::{NodeStore, State};
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

mod txpool;

pub use txpool::{AddedTransaction, PoolSize, TransactionOrigin, ValidPoolTransaction};
use txpool::TxPool;

/// Externally observable pool counters, injected at construction so callers
/// own where they surface.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Accepted transactions.
    pub inserted: AtomicU64,
    /// Rejected transactions.
    pub invalid: AtomicU64,
    /// Capacity evictions.
    pub evicted: AtomicU64,
    /// Lifetime expiries.
    pub expired: AtomicU64,
    /// Transactions removed because they were mined.
    pub mined: AtomicU64,
}

impl PoolStats {
    /// A point-in-time copy of the counters.
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            inserted: self.inserted.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            mined: self.mined.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct PoolStatsSnapshot {
    pub inserted: u64,
    pub invalid: u64,
    pub evicted: u64,
    pub expired: u64,
    pub mined: u64,
}

/// The transaction pool handle.
///
/// Cheap to clone; all clones share one pool. Everything that reads or
/// mutates pool membership goes through one internal lock, and canonical
/// head changes are applied under that same lock before any new
/// block-assembly view can be taken.
pub struct Pool<T: TransactionOrdering = GasPriceOrdering> {
    inner: Arc<PoolInner<T>>,
}

impl<T: TransactionOrdering> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: TransactionOrdering> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("size", &self.size()).finish()
    }
}

struct PoolInner<T: TransactionOrdering> {
    config: PoolConfig,
    validator: TransactionValidator,
    state_store: Arc<NodeStore>,
    pool: RwLock<TxPool<T>>,
    journal: Option<Journal>,
    stats: Arc<PoolStats>,
    pending_events: broadcast::Sender<TxHash>,
}

impl<T: TransactionOrdering> Pool<T> {
    /// Creates the pool aligned to the given canonical tip, replaying the
    /// local journal if one is configured.
    pub fn new(
        state_store: Arc<NodeStore>,
        tip: SealedHeader,
        chain_id: u64,
        ordering: T,
        config: PoolConfig,
        stats: Arc<PoolStats>,
    ) -> Self {
        let validator = TransactionValidator::new(chain_id, config.price_floor);
        let journal = config.journal_path.clone().map(Journal::new);
        let (pending_events, _) = broadcast::channel(1024);
        let pool = Self {
            inner: Arc::new(PoolInner {
                validator,
                state_store,
                pool: RwLock::new(TxPool::new(ordering, tip)),
                journal,
                stats,
                pending_events,
                config,
            }),
        };

        if let Some(journal) = &pool.inner.journal {
            let mut replayed = 0usize;
            for tx in journal.load() {
                // Journal entries may have gone stale while the node was
                // down; validation decides, silently.
                if pool.add_transaction(TransactionOrigin::Local, tx).is_ok() {
                    replayed += 1;
                }
            }
            if replayed > 0 {
                debug!(target: "txpool", replayed, "replayed local journal");
            }
        }
        pool
    }

    /// Submits a transaction from this node's own API.
    pub fn add_local(&self, tx: TransactionSigned) -> PoolResult<AddedTransaction> {
        self.add_transaction(TransactionOrigin::Local, tx)
    }

    /// Submits a transaction gossiped by a peer.
    pub fn add_external(&self, tx: TransactionSigned) -> PoolResult<AddedTransaction> {
        self.add_transaction(TransactionOrigin::External, tx)
    }

    /// Submits a transaction with the given origin.
    pub fn add_transaction(
        &self,
        origin: TransactionOrigin,
        tx: TransactionSigned,
    ) -> PoolResult<AddedTransaction> {
        let mut pool = self.inner.pool.write();
        let result = self.inner.add_locked(&mut pool, origin, tx);
        drop(pool);

        match &result {
            Ok(added) => {
                self.inner.stats.inserted.fetch_add(1, Ordering::Relaxed);
                if added.is_pending() {
                    let _ = self.inner.pending_events.send(added.hash());
                }
            }
            Err(_) => {
                self.inner.stats.invalid.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Whether the pool holds the transaction.
    pub fn contains(&self, hash: &TxHash) -> bool {
        self.inner.pool.read().contains(hash)
    }

    /// The pooled transaction with this hash, if any.
    pub fn get(&self, hash: &TxHash) -> Option<Arc<ValidPoolTransaction>> {
        self.inner.pool.read().get(hash)
    }

    /// Current pending/queued counts.
    pub fn size(&self) -> PoolSize {
        self.inner.pool.read().size()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// All includable transactions, unordered.
    pub fn pending_transactions(&self) -> Vec<Arc<ValidPoolTransaction>> {
        self.inner.pool.read().pending()
    }

    /// Includable transactions in assembly order.
    pub fn best_transactions(&self) -> Vec<Arc<ValidPoolTransaction>> {
        self.inner.pool.read().best()
    }

    /// Notifications for transactions entering the pending set.
    pub fn subscribe_pending(&self) -> broadcast::Receiver<TxHash> {
        self.inner.pending_events.subscribe()
    }

    /// Drops externals past their configured lifetime.
    pub fn evict_expired(&self) -> usize {
        let expired = self
            .inner
            .pool
            .write()
            .evict_expired(self.inner.config.lifetime, std::time::Instant::now());
        self.inner.stats.expired.fetch_add(expired.len() as u64, Ordering::Relaxed);
        if !expired.is_empty() {
            debug!(target: "txpool", count = expired.len(), "expired transactions");
        }
        expired.len()
    }
}

impl<T: TransactionOrdering> PoolInner<T> {
    fn account_at(&self, root: cairn_primitives::H256, address: Address) -> Account {
        State::new(Arc::clone(&self.state_store), root)
            .basic_account(address)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn add_locked(
        &self,
        pool: &mut TxPool<T>,
        origin: TransactionOrigin,
        tx: TransactionSigned,
    ) -> PoolResult<AddedTransaction> {
        if pool.contains(&tx.hash()) {
            return Err(PoolError::AlreadyImported(tx.hash()))
        }

        let block_gas_limit = pool.tip().gas_limit;
        let root = pool.state_root();
        let recovered = self.validator.validate(
            origin,
            tx,
            |address| Some(self.account_at(root, address)),
            block_gas_limit,
        )?;
        let account = self.account_at(root, recovered.signer());

        let hash = recovered.hash();
        let journal_entry = origin.is_local().then(|| recovered.as_signed().clone());
        let added = pool.add(recovered, origin, account, &self.config)?;

        let evicted = pool.enforce_capacity(self.config.max_total);
        self.stats.evicted.fetch_add(evicted.len() as u64, Ordering::Relaxed);
        if evicted.iter().any(|tx| tx.hash() == hash) {
            return Err(PoolError::PoolFull)
        }

        if let (Some(entry), Some(journal)) = (journal_entry, &self.journal) {
            journal.append(&entry);
        }
        Ok(added)
    }
}

impl<T: TransactionOrdering> CanonStateListener for Pool<T> {
    fn on_canonical_state_change(&self, update: CanonicalStateUpdate) {
        let CanonicalStateUpdate { new_tip, state_root, mined_transactions, reinjected } =
            update;
        trace!(
            target: "txpool",
            tip = %new_tip.num_hash(),
            mined = mined_transactions.len(),
            reinjected = reinjected.len(),
            "canonical state change"
        );

        let mut pool = self.inner.pool.write();
        self.inner
            .stats
            .mined
            .fetch_add(mined_transactions.len() as u64, Ordering::Relaxed);

        let dropped = pool.on_canonical_change(new_tip, state_root, &mined_transactions, |address| {
            self.inner.account_at(state_root, address)
        });
        if !dropped.is_empty() {
            debug!(target: "txpool", count = dropped.len(), "dropped stale transactions");
        }

        for tx in reinjected {
            if let Err(error) =
                self.inner.add_locked(&mut pool, TransactionOrigin::Reinjected, tx)
            {
                trace!(target: "txpool", %error, "reinjected transaction rejected");
            }
        }

        if let Some(journal) = &self.inner.journal {
            journal.rotate(pool.locals().map(|tx| tx.transaction.as_signed()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InvalidPoolTransactionError;
    use cairn_primitives::{
        constants::EMPTY_ROOT, Address, Header, Transaction, TransactionKind, U256,
    };
    use secp256k1::SecretKey;
    use std::time::Duration;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn address(byte: u8) -> Address {
        TransactionSigned::sign(Transaction::default(), &key(byte))
            .unwrap()
            .recover_signer()
            .unwrap()
    }

    fn tx(sender: u8, nonce: u64, gas_price: u128, value: u64) -> TransactionSigned {
        let tx = Transaction {
            chain_id: 1337,
            nonce,
            gas_price,
            gas_limit: 21_000,
            to: TransactionKind::Call(Address::repeat_byte(0x99)),
            value: U256::from(value),
            input: Default::default(),
        };
        TransactionSigned::sign(tx, &key(sender)).unwrap()
    }

    const FUNDS: u64 = 1_000_000_000_000;

    fn setup_with(config: PoolConfig, sender_nonces: &[(u8, u64)]) -> Pool {
        let store = Arc::new(NodeStore::new());
        let mut state = State::new(Arc::clone(&store), EMPTY_ROOT);
        for (sender, nonce) in sender_nonces {
            let addr = address(*sender);
            state.add_balance(addr, U256::from(FUNDS)).unwrap();
            for _ in 0..*nonce {
                state.increment_nonce(addr).unwrap();
            }
        }
        let root = state.commit().unwrap();
        let tip = Header { gas_limit: 8_000_000, state_root: root, ..Default::default() }.seal();
        Pool::new(store, tip, 1337, GasPriceOrdering, config, Arc::new(PoolStats::default()))
    }

    fn setup() -> Pool {
        setup_with(PoolConfig::default(), &[(0xaa, 0), (0xbb, 0), (0xcc, 0)])
    }

    #[test]
    fn nonce_gap_queues_until_filled() {
        let pool = setup();
        let added = pool.add_external(tx(0xaa, 0, 10, 1)).unwrap();
        assert!(added.is_pending());

        // Nonce 2 has a gap: nonce 1 is missing.
        let added = pool.add_external(tx(0xaa, 2, 10, 1)).unwrap();
        assert!(!added.is_pending());
        assert_eq!(pool.size(), PoolSize { pending: 1, queued: 1 });

        // Filling the gap promotes the whole run.
        let added = pool.add_external(tx(0xaa, 1, 10, 1)).unwrap();
        assert!(added.is_pending());
        assert_eq!(pool.size(), PoolSize { pending: 3, queued: 0 });
    }

    #[test]
    fn stale_nonce_is_rejected() {
        let pool = setup_with(PoolConfig::default(), &[(0xaa, 1)]);
        let result = pool.add_external(tx(0xaa, 0, 10, 1));
        assert_eq!(
            result,
            Err(PoolError::Invalid(InvalidPoolTransactionError::NonceTooLow {
                tx: 0,
                state: 1
            }))
        );
    }

    #[test]
    fn insufficient_funds_is_rejected() {
        let pool = setup();
        let result = pool.add_external(tx(0xaa, 0, 10, FUNDS));
        assert!(matches!(
            result,
            Err(PoolError::Invalid(InvalidPoolTransactionError::InsufficientFunds { .. }))
        ));
    }

    #[test]
    fn underpriced_external_is_rejected_but_local_accepted() {
        let config = PoolConfig { price_floor: 5, ..Default::default() };
        let pool = setup_with(config, &[(0xaa, 0), (0xbb, 0)]);
        assert!(matches!(
            pool.add_external(tx(0xaa, 0, 1, 1)),
            Err(PoolError::Underpriced { price: 1, floor: 5 })
        ));
        pool.add_local(tx(0xbb, 0, 1, 1)).unwrap();
    }

    #[test]
    fn replacement_requires_price_bump() {
        let pool = setup();
        pool.add_external(tx(0xaa, 0, 100, 1)).unwrap();
        let original = tx(0xaa, 0, 100, 1).hash();

        // 5% more is below the 10% bump.
        assert!(matches!(
            pool.add_external(tx(0xaa, 0, 105, 2)),
            Err(PoolError::ReplacementUnderpriced(_))
        ));

        pool.add_external(tx(0xaa, 0, 110, 2)).unwrap();
        assert!(!pool.contains(&original));
        assert_eq!(pool.size(), PoolSize { pending: 1, queued: 0 });
    }

    #[test]
    fn capacity_evicts_cheapest_external_first() {
        let config = PoolConfig { max_total: 2, ..Default::default() };
        let pool = setup_with(config, &[(0xaa, 0), (0xbb, 0), (0xcc, 0)]);

        pool.add_local(tx(0xaa, 0, 1, 1)).unwrap();
        let cheap = pool.add_external(tx(0xbb, 0, 5, 1)).unwrap().hash();
        pool.add_external(tx(0xcc, 0, 10, 1)).unwrap();

        // The local stayed despite being the cheapest of all three.
        assert_eq!(pool.size(), PoolSize { pending: 2, queued: 0 });
        assert!(!pool.contains(&cheap));
        assert_eq!(pool.stats().evicted, 1);
    }

    #[test]
    fn full_pool_of_locals_rejects_externals() {
        let config = PoolConfig { max_total: 1, ..Default::default() };
        let pool = setup_with(config, &[(0xaa, 0), (0xbb, 0)]);
        pool.add_local(tx(0xaa, 0, 100, 1)).unwrap();
        assert_eq!(pool.add_external(tx(0xbb, 0, 1, 1)), Err(PoolError::PoolFull));
    }

    #[test]
    fn lifetime_expiry_spares_locals() {
        let config = PoolConfig { lifetime: Duration::ZERO, ..Default::default() };
        let pool = setup_with(config, &[(0xaa, 0), (0xbb, 0)]);
        pool.add_local(tx(0xaa, 0, 10, 1)).unwrap();
        pool.add_external(tx(0xbb, 0, 10, 1)).unwrap();

        assert_eq!(pool.evict_expired(), 1);
        assert_eq!(pool.size(), PoolSize { pending: 1, queued: 0 });
    }

    #[test]
    fn canonical_change_removes_mined_and_realigns() {
        let pool = setup();
        let t0 = pool.add_external(tx(0xaa, 0, 10, 1)).unwrap().hash();
        pool.add_external(tx(0xaa, 1, 10, 1)).unwrap();
        assert_eq!(pool.size(), PoolSize { pending: 2, queued: 0 });

        // Simulate a new head where nonce 0 was mined.
        let store = Arc::clone(&pool.inner.state_store);
        let mut state = State::new(store, pool.inner.pool.read().state_root());
        state.increment_nonce(address(0xaa)).unwrap();
        let new_root = state.commit().unwrap();
        let new_tip =
            Header { number: 1, gas_limit: 8_000_000, state_root: new_root, ..Default::default() }
                .seal();

        pool.on_canonical_state_change(CanonicalStateUpdate {
            new_tip,
            state_root: new_root,
            mined_transactions: vec![t0],
            reinjected: vec![],
        });

        assert!(!pool.contains(&t0));
        assert_eq!(pool.size(), PoolSize { pending: 1, queued: 0 });
        assert_eq!(pool.stats().mined, 1);
    }

    #[test]
    fn reorged_transactions_are_reinjected_as_pending() {
        let pool = setup();
        let orphaned = tx(0xaa, 0, 10, 1);
        let tip = pool.inner.pool.read().tip().clone();
        let root = pool.inner.pool.read().state_root();

        pool.on_canonical_state_change(CanonicalStateUpdate {
            new_tip: tip,
            state_root: root,
            mined_transactions: vec![],
            reinjected: vec![orphaned.clone()],
        });

        assert!(pool.contains(&orphaned.hash()));
        assert_eq!(pool.size(), PoolSize { pending: 1, queued: 0 });
    }

    #[test]
    fn best_orders_by_price_then_arrival_with_nonce_order() {
        let pool = setup();
        pool.add_external(tx(0xaa, 0, 10, 1)).unwrap();
        pool.add_external(tx(0xaa, 1, 100, 1)).unwrap();
        pool.add_external(tx(0xbb, 0, 5, 1)).unwrap();
        pool.add_external(tx(0xcc, 0, 5, 1)).unwrap();

        let best = pool.best_transactions();
        let senders: Vec<Address> = best.iter().map(|t| t.sender()).collect();
        assert_eq!(
            senders,
            vec![address(0xaa), address(0xaa), address(0xbb), address(0xcc)],
            "price wins, nonce order is kept, arrival breaks the 5-price tie"
        );
        assert_eq!(best[0].nonce(), 0);
        assert_eq!(best[1].nonce(), 1);
    }

    #[test]
    fn journal_restores_locals_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.journal");
        let config = PoolConfig { journal_path: Some(path.clone()), ..Default::default() };

        let local = tx(0xaa, 0, 10, 1);
        let external = tx(0xbb, 0, 10, 1);
        {
            let pool = setup_with(config.clone(), &[(0xaa, 0), (0xbb, 0)]);
            pool.add_local(local.clone()).unwrap();
            pool.add_external(external.clone()).unwrap();
        }

        let pool = setup_with(config, &[(0xaa, 0), (0xbb, 0)]);
        assert!(pool.contains(&local.hash()));
        assert!(!pool.contains(&external.hash()));
    }

    #[test]
    fn pending_event_is_broadcast() {
        let pool = setup();
        let mut events = pool.subscribe_pending();
        let added = pool.add_external(tx(0xaa, 0, 10, 1)).unwrap();
        assert_eq!(events.try_recv().unwrap(), added.hash());
    }
}
