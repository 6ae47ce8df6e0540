use cairn_primitives::{SealedHeader, TransactionSigned, TxHash, H256};

/// Everything the transaction pool needs to realign itself after the
/// canonical chain moved.
#[derive(Debug, Clone)]
pub struct CanonicalStateUpdate {
    /// The new canonical tip.
    pub new_tip: SealedHeader,
    /// Root of the state at the new tip.
    pub state_root: H256,
    /// Transactions mined into the canonical chain by this change.
    pub mined_transactions: Vec<TxHash>,
    /// Transactions from abandoned blocks to resubmit as pending.
    pub reinjected: Vec<TransactionSigned>,
}

/// Synchronous observer of canonical head changes.
///
/// Called under the chain's writer exclusion, before the insertion that
/// caused the change returns: the pool must never serve a block-assembly
/// view computed against a stale head.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait CanonStateListener: Send + Sync {
    /// Applies the canonical state change.
    fn on_canonical_state_change(&self, update: CanonicalStateUpdate);
}
