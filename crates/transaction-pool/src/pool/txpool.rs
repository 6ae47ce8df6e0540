//! The internal transaction pool implementation.

use crate::{ordering::TransactionOrdering, PoolConfig, PoolError};
use cairn_primitives::{
    Account, Address, SealedHeader, TransactionSignedEcRecovered, TxHash, H256, U256,
};
use fnv::FnvHashMap;
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::trace;

/// Where a transaction entered the pool from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOrigin {
    /// Submitted through this node's own API; trusted, journaled, never
    /// price-evicted.
    Local,
    /// Gossiped by a peer.
    External,
    /// Returned to the pool by a reorg; skips the price floor once but is
    /// otherwise treated as external.
    Reinjected,
}

impl TransactionOrigin {
    /// Whether this origin is exempt from eviction and journaled.
    pub fn is_local(&self) -> bool {
        matches!(self, TransactionOrigin::Local)
    }

    /// Whether the price floor applies.
    pub fn enforces_price_floor(&self) -> bool {
        matches!(self, TransactionOrigin::External)
    }
}

/// A transaction that passed validation, with its pool bookkeeping.
#[derive(Debug, Clone)]
pub struct ValidPoolTransaction {
    /// The validated transaction with its recovered sender.
    pub transaction: TransactionSignedEcRecovered,
    /// Submission origin.
    pub origin: TransactionOrigin,
    /// Arrival sequence number, the ordering tie break.
    pub submission_id: u64,
    /// When the pool accepted it.
    pub added_at: Instant,
}

impl ValidPoolTransaction {
    /// The transaction's identity hash.
    pub fn hash(&self) -> TxHash {
        self.transaction.hash()
    }

    /// The recovered sender.
    pub fn sender(&self) -> Address {
        self.transaction.signer()
    }

    /// The transaction's nonce.
    pub fn nonce(&self) -> u64 {
        self.transaction.nonce
    }

    /// Whether this is a local transaction.
    pub fn is_local(&self) -> bool {
        self.origin.is_local()
    }
}

/// The disposition of a newly added transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddedTransaction {
    /// Includable now: no nonce gap, funded.
    Pending {
        /// The transaction's hash.
        hash: TxHash,
    },
    /// Parked until the sender's nonce gap closes or funds arrive.
    Queued {
        /// The transaction's hash.
        hash: TxHash,
    },
}

impl AddedTransaction {
    /// The hash of the added transaction.
    pub fn hash(&self) -> TxHash {
        match self {
            AddedTransaction::Pending { hash } | AddedTransaction::Queued { hash } => *hash,
        }
    }

    /// Whether the transaction landed in the pending set.
    pub fn is_pending(&self) -> bool {
        matches!(self, AddedTransaction::Pending { .. })
    }
}

/// Pool occupancy counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSize {
    /// Includable transactions.
    pub pending: usize,
    /// Parked transactions.
    pub queued: usize,
}

#[derive(Debug, Default)]
struct SenderTxs {
    txs: BTreeMap<u64, Arc<ValidPoolTransaction>>,
    state_nonce: u64,
    balance: U256,
}

impl SenderTxs {
    /// How many leading transactions are includable: consecutive nonces from
    /// the account nonce, cumulatively covered by the balance.
    fn pending_len(&self) -> usize {
        let mut expected = self.state_nonce;
        let mut budget = self.balance;
        let mut count = 0;
        for (nonce, tx) in self.txs.iter() {
            if *nonce != expected {
                break
            }
            let cost = tx.transaction.cost();
            if cost > budget {
                break
            }
            budget -= cost;
            expected += 1;
            count += 1;
        }
        count
    }

    fn pending(&self) -> impl Iterator<Item = &Arc<ValidPoolTransaction>> {
        self.txs.values().take(self.pending_len())
    }
}

/// The pool state proper: all transactions grouped per sender in nonce
/// order, plus the chain position it was last aligned to.
///
/// The pending/queued split is derived, not stored: a sender's leading run
/// of gap-free, funded transactions is pending, the remainder queued. That
/// makes promotion and demotion on head changes a pure consequence of
/// updating the sender's account snapshot.
pub(crate) struct TxPool<T: TransactionOrdering> {
    ordering: T,
    tip: SealedHeader,
    state_root: H256,
    by_hash: HashMap<TxHash, Arc<ValidPoolTransaction>>,
    senders: FnvHashMap<Address, SenderTxs>,
    submission_id: u64,
}

impl<T: TransactionOrdering> TxPool<T> {
    pub(crate) fn new(ordering: T, tip: SealedHeader) -> Self {
        let state_root = tip.state_root;
        Self {
            ordering,
            tip,
            state_root,
            by_hash: HashMap::new(),
            senders: FnvHashMap::default(),
            submission_id: 0,
        }
    }

    pub(crate) fn tip(&self) -> &SealedHeader {
        &self.tip
    }

    pub(crate) fn state_root(&self) -> H256 {
        self.state_root
    }

    pub(crate) fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub(crate) fn contains(&self, hash: &TxHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub(crate) fn get(&self, hash: &TxHash) -> Option<Arc<ValidPoolTransaction>> {
        self.by_hash.get(hash).cloned()
    }

    pub(crate) fn size(&self) -> PoolSize {
        let pending: usize = self.senders.values().map(SenderTxs::pending_len).sum();
        PoolSize { pending, queued: self.by_hash.len() - pending }
    }

    /// All local transactions, for journal rotation.
    pub(crate) fn locals(&self) -> impl Iterator<Item = &Arc<ValidPoolTransaction>> {
        self.by_hash.values().filter(|tx| tx.is_local())
    }

    /// Adds a validated transaction for a sender whose account snapshot is
    /// `account`.
    pub(crate) fn add(
        &mut self,
        transaction: TransactionSignedEcRecovered,
        origin: TransactionOrigin,
        account: Account,
        config: &PoolConfig,
    ) -> Result<AddedTransaction, PoolError> {
        let hash = transaction.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(PoolError::AlreadyImported(hash))
        }

        let sender = transaction.signer();
        let nonce = transaction.nonce;
        let entry = self.senders.entry(sender).or_default();
        entry.state_nonce = account.nonce;
        entry.balance = account.balance;

        // Same-nonce replacement must outbid the incumbent by the bump.
        if let Some(existing) = entry.txs.get(&nonce) {
            let required = existing.transaction.gas_price.saturating_mul(100 + config.price_bump_percent) / 100;
            if transaction.gas_price < required.max(existing.transaction.gas_price + 1) {
                return Err(PoolError::ReplacementUnderpriced(existing.hash()))
            }
            let old = entry.txs.remove(&nonce);
            if let Some(old) = old {
                self.by_hash.remove(&old.hash());
            }
        } else if entry.txs.len() >= config.max_account_slots {
            return Err(PoolError::SpammerExceededCapacity(sender))
        }

        self.submission_id += 1;
        let valid = Arc::new(ValidPoolTransaction {
            transaction,
            origin,
            submission_id: self.submission_id,
            added_at: Instant::now(),
        });
        self.by_hash.insert(hash, Arc::clone(&valid));
        let entry = self.senders.entry(sender).or_default();
        entry.txs.insert(nonce, valid);

        let outcome = if entry.pending_len() > nonce.saturating_sub(entry.state_nonce) as usize {
            AddedTransaction::Pending { hash }
        } else {
            AddedTransaction::Queued { hash }
        };
        trace!(target: "txpool", ?hash, pending = outcome.is_pending(), "added transaction");
        Ok(outcome)
    }

    /// Removes a transaction by hash.
    pub(crate) fn remove_by_hash(&mut self, hash: &TxHash) -> Option<Arc<ValidPoolTransaction>> {
        let tx = self.by_hash.remove(hash)?;
        if let Some(entry) = self.senders.get_mut(&tx.sender()) {
            entry.txs.remove(&tx.nonce());
            if entry.txs.is_empty() {
                self.senders.remove(&tx.sender());
            }
        }
        Some(tx)
    }

    /// Shrinks the pool back under `max_total`, cheapest externals first,
    /// ties broken by oldest arrival. Locals are never evicted.
    pub(crate) fn enforce_capacity(
        &mut self,
        max_total: usize,
    ) -> Vec<Arc<ValidPoolTransaction>> {
        let mut evicted = Vec::new();
        while self.by_hash.len() > max_total {
            let victim = self
                .by_hash
                .values()
                .filter(|tx| !tx.is_local())
                .min_by(|a, b| {
                    self.ordering
                        .priority(&a.transaction)
                        .cmp(&self.ordering.priority(&b.transaction))
                        .then(a.submission_id.cmp(&b.submission_id))
                })
                .map(|tx| tx.hash());
            let Some(hash) = victim else { break };
            if let Some(tx) = self.remove_by_hash(&hash) {
                evicted.push(tx);
            }
        }
        evicted
    }

    /// Drops externals that have idled past their lifetime.
    pub(crate) fn evict_expired(
        &mut self,
        lifetime: Duration,
        now: Instant,
    ) -> Vec<Arc<ValidPoolTransaction>> {
        let expired: Vec<TxHash> = self
            .by_hash
            .values()
            .filter(|tx| !tx.is_local() && now.duration_since(tx.added_at) >= lifetime)
            .map(|tx| tx.hash())
            .collect();
        expired.iter().filter_map(|hash| self.remove_by_hash(hash)).collect()
    }

    /// Realigns the pool to a new canonical tip: drops mined and stale
    /// transactions and refreshes every sender's account snapshot, which
    /// promotes or demotes the rest implicitly.
    pub(crate) fn on_canonical_change(
        &mut self,
        tip: SealedHeader,
        state_root: H256,
        mined: &[TxHash],
        mut account_of: impl FnMut(Address) -> Account,
    ) -> Vec<Arc<ValidPoolTransaction>> {
        self.tip = tip;
        self.state_root = state_root;

        for hash in mined {
            self.remove_by_hash(hash);
        }

        let senders: Vec<Address> = self.senders.keys().copied().collect();
        let mut dropped = Vec::new();
        for sender in senders {
            let account = account_of(sender);
            let stale: Vec<TxHash> = {
                let Some(entry) = self.senders.get_mut(&sender) else { continue };
                entry.state_nonce = account.nonce;
                entry.balance = account.balance;
                entry
                    .txs
                    .range(..account.nonce)
                    .map(|(_, tx)| tx.hash())
                    .collect()
            };
            for hash in stale {
                if let Some(tx) = self.remove_by_hash(&hash) {
                    dropped.push(tx);
                }
            }
        }
        dropped
    }

    /// All currently includable transactions, unordered.
    pub(crate) fn pending(&self) -> Vec<Arc<ValidPoolTransaction>> {
        self.senders.values().flat_map(|entry| entry.pending().cloned()).collect()
    }

    /// Includable transactions in block-assembly order: highest priority
    /// first, arrival as tie break, per-sender nonce order preserved.
    pub(crate) fn best(&self) -> Vec<Arc<ValidPoolTransaction>> {
        struct Candidate<P: Ord> {
            priority: P,
            submission: Reverse<u64>,
            sender: Address,
            index: usize,
        }
        impl<P: Ord> PartialEq for Candidate<P> {
            fn eq(&self, other: &Self) -> bool {
                self.priority == other.priority && self.submission == other.submission
            }
        }
        impl<P: Ord> Eq for Candidate<P> {}
        impl<P: Ord> PartialOrd for Candidate<P> {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }
        impl<P: Ord> Ord for Candidate<P> {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.priority
                    .cmp(&other.priority)
                    .then(self.submission.cmp(&other.submission))
            }
        }

        let sequences: HashMap<Address, Vec<Arc<ValidPoolTransaction>>> = self
            .senders
            .iter()
            .map(|(sender, entry)| (*sender, entry.pending().cloned().collect()))
            .filter(|(_, txs): &(_, Vec<_>)| !txs.is_empty())
            .collect();

        let mut heap: BinaryHeap<Candidate<T::Priority>> = sequences
            .iter()
            .map(|(sender, txs)| Candidate {
                priority: self.ordering.priority(&txs[0].transaction),
                submission: Reverse(txs[0].submission_id),
                sender: *sender,
                index: 0,
            })
            .collect();

        let mut out = Vec::new();
        while let Some(candidate) = heap.pop() {
            let txs = &sequences[&candidate.sender];
            out.push(Arc::clone(&txs[candidate.index]));
            let next = candidate.index + 1;
            if next < txs.len() {
                heap.push(Candidate {
                    priority: self.ordering.priority(&txs[next].transaction),
                    submission: Reverse(txs[next].submission_id),
                    sender: candidate.sender,
                    index: next,
                });
            }
        }
        out
    }
}

impl<T: TransactionOrdering> std::fmt::Debug for TxPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxPool")
            .field("len", &self.by_hash.len())
            .field("tip", &self.tip.num_hash())
            .finish()
    }
}
