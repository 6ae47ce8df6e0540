use crate::{constants::EMPTY_ROOT, H256, U256};
use serde::{Deserialize, Serialize};

/// The state of an account as stored in the state trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Number of transactions sent from this account; strictly increasing.
    pub nonce: u64,
    /// Account balance.
    pub balance: U256,
    /// Hash of the account's code, if any was deployed.
    pub bytecode_hash: Option<H256>,
    /// Root of the account's storage trie.
    pub storage_root: H256,
}

impl Default for Account {
    fn default() -> Self {
        Self { nonce: 0, balance: U256::zero(), bytecode_hash: None, storage_root: EMPTY_ROOT }
    }
}

impl Account {
    /// Whether the account has deployed code.
    pub fn has_bytecode(&self) -> bool {
        self.bytecode_hash.is_some()
    }

    /// Whether the account is indistinguishable from a non-existent one.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 &&
            self.balance.is_zero() &&
            self.bytecode_hash.is_none() &&
            self.storage_root == EMPTY_ROOT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_account_is_empty() {
        assert!(Account::default().is_empty());
        assert!(!Account { nonce: 1, ..Default::default() }.is_empty());
    }
}
