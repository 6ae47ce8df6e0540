use cairn_primitives::TransactionSigned;
use std::fmt;

/// Decides how pending transactions rank for block assembly and eviction.
///
/// The returned priority must be a total order; higher is better.
pub trait TransactionOrdering: Send + Sync + 'static {
    /// Priority of a transaction.
    type Priority: Ord + Clone + fmt::Debug + Send + Sync;

    /// Returns the priority score for the given transaction.
    fn priority(&self, transaction: &TransactionSigned) -> Self::Priority;
}

/// Orders by offered gas price.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct GasPriceOrdering;

impl TransactionOrdering for GasPriceOrdering {
    type Priority = u128;

    fn priority(&self, transaction: &TransactionSigned) -> Self::Priority {
        transaction.gas_price
    }
}
