use crate::{Bloom, Log};
use serde::{Deserialize, Serialize};

/// The post-execution outcome of a single transaction.
///
/// Receipts are derived data: one per transaction, in body order, never
/// mutated independently of re-execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Receipt {
    /// Whether execution succeeded.
    pub success: bool,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
    /// Bloom filter over this receipt's logs.
    pub bloom: Bloom,
}

impl Receipt {
    /// Builds a receipt, deriving the bloom from the logs.
    pub fn new(success: bool, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        let bloom = Bloom::from_logs(logs.iter());
        Self { success, cumulative_gas_used, logs, bloom }
    }
}
