use std::{path::PathBuf, time::Duration};

/// Transaction pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum transactions one sender may occupy.
    pub max_account_slots: usize,
    /// Maximum transactions in the pool overall.
    pub max_total: usize,
    /// Soft minimum gas price for externally submitted transactions.
    pub price_floor: u128,
    /// Required relative gas price increase to replace a same-nonce
    /// transaction, in percent.
    pub price_bump_percent: u128,
    /// How long external transactions may idle in the pool.
    pub lifetime: Duration,
    /// Where local transactions are journaled across restarts, if anywhere.
    pub journal_path: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_account_slots: 16,
            max_total: 4096,
            price_floor: 1,
            price_bump_percent: 10,
            lifetime: Duration::from_secs(3 * 60 * 60),
            journal_path: None,
        }
    }
}
