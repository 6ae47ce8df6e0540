use crate::{trie::NodeStore, StateError};
use cairn_primitives::{
    encode, Account, Address, GenesisAccount, StorageKey, StorageValue, H256, U256,
};
use std::{collections::HashMap, sync::Arc};
use tracing::trace;

/// A mutable view over the state committed at a given trie root.
///
/// Reads fall through an in-memory overlay to the backing trie; writes only
/// touch the overlay until [`commit`](Self::commit) folds them into the trie
/// and yields the new root. A journal records every overlay mutation so the
/// view supports cheap [`snapshot`](Self::snapshot)/[`revert_to`](Self::revert_to),
/// which execution uses to undo failed transactions.
#[derive(Debug)]
pub struct State {
    store: Arc<NodeStore>,
    root: H256,
    accounts: HashMap<Address, Option<Account>>,
    storage: HashMap<(Address, StorageKey), StorageValue>,
    journal: Vec<JournalEntry>,
}

#[derive(Debug)]
enum JournalEntry {
    Account {
        address: Address,
        prev: Option<Option<Account>>,
    },
    Storage {
        address: Address,
        key: StorageKey,
        prev: Option<StorageValue>,
    },
}

impl State {
    /// Opens a view over the state committed at `root`.
    pub fn new(store: Arc<NodeStore>, root: H256) -> Self {
        Self {
            store,
            root,
            accounts: HashMap::new(),
            storage: HashMap::new(),
            journal: Vec::new(),
        }
    }

    /// The root this view was opened at; uncommitted writes are not included.
    pub fn root(&self) -> H256 {
        self.root
    }

    /// The backing node store.
    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    /// The account at `address`, if it exists.
    pub fn basic_account(&self, address: Address) -> Result<Option<Account>, StateError> {
        if let Some(overlay) = self.accounts.get(&address) {
            return Ok(*overlay)
        }
        self.load_account(address)
    }

    fn load_account(&self, address: Address) -> Result<Option<Account>, StateError> {
        let Some(bytes) = self.store.trie_get(self.root, address.as_bytes())? else {
            return Ok(None)
        };
        bincode::deserialize(&bytes).map(Some).map_err(|e| StateError::Decode(e.to_string()))
    }

    fn write_account(&mut self, address: Address, account: Account) {
        let prev = self.accounts.insert(address, Some(account));
        self.journal.push(JournalEntry::Account { address, prev });
    }

    /// Credits `amount` to `address`, creating the account if needed.
    pub fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let mut account = self.basic_account(address)?.unwrap_or_default();
        account.balance =
            account.balance.checked_add(amount).ok_or(StateError::BalanceOverflow)?;
        self.write_account(address, account);
        Ok(())
    }

    /// Debits `amount` from `address`.
    pub fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let mut account = self.basic_account(address)?.unwrap_or_default();
        account.balance =
            account.balance.checked_sub(amount).ok_or(StateError::BalanceOverflow)?;
        self.write_account(address, account);
        Ok(())
    }

    /// Advances the account nonce by one.
    pub fn increment_nonce(&mut self, address: Address) -> Result<(), StateError> {
        let mut account = self.basic_account(address)?.unwrap_or_default();
        account.nonce += 1;
        self.write_account(address, account);
        Ok(())
    }

    /// Records deployed code for the account.
    pub fn set_bytecode_hash(&mut self, address: Address, hash: H256) -> Result<(), StateError> {
        let mut account = self.basic_account(address)?.unwrap_or_default();
        account.bytecode_hash = Some(hash);
        self.write_account(address, account);
        Ok(())
    }

    /// Writes a storage slot of `address`.
    pub fn set_storage(
        &mut self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), StateError> {
        let prev = self.storage.insert((address, key), value);
        self.journal.push(JournalEntry::Storage { address, key, prev });
        Ok(())
    }

    /// Reads a storage slot of `address`.
    pub fn get_storage(
        &self,
        address: Address,
        key: StorageKey,
    ) -> Result<StorageValue, StateError> {
        if let Some(value) = self.storage.get(&(address, key)) {
            return Ok(*value)
        }
        let Some(account) = self.basic_account(address)? else { return Ok(U256::zero()) };
        let Some(bytes) = self.store.trie_get(account.storage_root, key.as_bytes())? else {
            return Ok(U256::zero())
        };
        bincode::deserialize(&bytes).map_err(|e| StateError::Decode(e.to_string()))
    }

    /// Marks the current overlay position; later mutations can be undone with
    /// [`revert_to`](Self::revert_to).
    pub fn snapshot(&self) -> usize {
        self.journal.len()
    }

    /// Unwinds all mutations made after `snapshot`.
    pub fn revert_to(&mut self, snapshot: usize) {
        while self.journal.len() > snapshot {
            // Loop condition guarantees the pop succeeds.
            let Some(entry) = self.journal.pop() else { break };
            match entry {
                JournalEntry::Account { address, prev } => match prev {
                    Some(value) => {
                        self.accounts.insert(address, value);
                    }
                    None => {
                        self.accounts.remove(&address);
                    }
                },
                JournalEntry::Storage { address, key, prev } => match prev {
                    Some(value) => {
                        self.storage.insert((address, key), value);
                    }
                    None => {
                        self.storage.remove(&(address, key));
                    }
                },
            }
        }
    }

    /// Funds the genesis allocation. Only meaningful on an empty state.
    pub fn apply_alloc(&mut self, alloc: &[GenesisAccount]) -> Result<(), StateError> {
        for entry in alloc {
            self.add_balance(entry.address, entry.balance)?;
        }
        Ok(())
    }

    /// Folds the overlay into the trie, returning the new root.
    ///
    /// The previous version remains readable through its own root; commit
    /// only adds nodes.
    pub fn commit(&mut self) -> Result<H256, StateError> {
        // Fold dirty storage slots into their accounts' storage tries first,
        // so the account leaves written below carry the final storage roots.
        let mut storage_writes: HashMap<Address, Vec<(StorageKey, StorageValue)>> =
            HashMap::new();
        for ((address, key), value) in self.storage.drain() {
            storage_writes.entry(address).or_default().push((key, value));
        }
        for (address, mut writes) in storage_writes {
            // Deterministic fold order; the resulting root does not depend on
            // it, but keeps reruns byte-identical in logs.
            writes.sort_by_key(|(key, _)| *key);
            let mut account = match self.accounts.get(&address) {
                Some(overlay) => overlay.unwrap_or_default(),
                None => self.load_account(address)?.unwrap_or_default(),
            };
            for (key, value) in writes {
                account.storage_root = self.store.trie_insert(
                    account.storage_root,
                    key.as_bytes(),
                    encode(&value),
                )?;
            }
            self.accounts.insert(address, Some(account));
        }

        let mut root = self.root;
        for (address, account) in self.accounts.drain() {
            if let Some(account) = account {
                root = self.store.trie_insert(root, address.as_bytes(), encode(&account))?;
            }
        }

        trace!(target: "state", old = ?self.root, new = ?root, "committed state");
        self.root = root;
        self.journal.clear();
        Ok(root)
    }
}

/// Computes the state root of a genesis allocation on the given store.
pub fn genesis_state_root(
    store: &Arc<NodeStore>,
    alloc: &[GenesisAccount],
) -> Result<H256, StateError> {
    let mut state = State::new(Arc::clone(store), cairn_primitives::constants::EMPTY_ROOT);
    state.apply_alloc(alloc)?;
    state.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn fresh() -> State {
        State::new(Arc::new(NodeStore::new()), cairn_primitives::constants::EMPTY_ROOT)
    }

    #[test]
    fn balance_roundtrip() {
        let mut state = fresh();
        state.add_balance(addr(1), U256::from(100u64)).unwrap();
        state.sub_balance(addr(1), U256::from(40u64)).unwrap();
        assert_eq!(state.basic_account(addr(1)).unwrap().unwrap().balance, U256::from(60u64));
    }

    #[test]
    fn sub_balance_underflow_is_an_error() {
        let mut state = fresh();
        state.add_balance(addr(1), U256::from(10u64)).unwrap();
        assert_eq!(
            state.sub_balance(addr(1), U256::from(11u64)),
            Err(StateError::BalanceOverflow)
        );
    }

    #[test]
    fn snapshot_revert_restores_reads() {
        let mut state = fresh();
        state.add_balance(addr(1), U256::from(100u64)).unwrap();
        let snap = state.snapshot();
        state.sub_balance(addr(1), U256::from(30u64)).unwrap();
        state.increment_nonce(addr(1)).unwrap();
        state.set_storage(addr(1), H256::repeat_byte(2), U256::from(5u64)).unwrap();

        state.revert_to(snap);
        let account = state.basic_account(addr(1)).unwrap().unwrap();
        assert_eq!(account.balance, U256::from(100u64));
        assert_eq!(account.nonce, 0);
        assert_eq!(state.get_storage(addr(1), H256::repeat_byte(2)).unwrap(), U256::zero());
    }

    #[test]
    fn commit_makes_new_root_and_keeps_old() {
        let store = Arc::new(NodeStore::new());
        let mut state = State::new(Arc::clone(&store), cairn_primitives::constants::EMPTY_ROOT);
        state.add_balance(addr(1), U256::from(100u64)).unwrap();
        let root_v1 = state.commit().unwrap();

        state.sub_balance(addr(1), U256::from(1u64)).unwrap();
        let root_v2 = state.commit().unwrap();
        assert_ne!(root_v1, root_v2);

        let old = State::new(Arc::clone(&store), root_v1);
        assert_eq!(old.basic_account(addr(1)).unwrap().unwrap().balance, U256::from(100u64));
        let new = State::new(store, root_v2);
        assert_eq!(new.basic_account(addr(1)).unwrap().unwrap().balance, U256::from(99u64));
    }

    #[test]
    fn same_contents_same_root() {
        let store_a = Arc::new(NodeStore::new());
        let mut a = State::new(Arc::clone(&store_a), cairn_primitives::constants::EMPTY_ROOT);
        a.add_balance(addr(1), U256::from(1u64)).unwrap();
        a.add_balance(addr(2), U256::from(2u64)).unwrap();
        let root_a = a.commit().unwrap();

        let store_b = Arc::new(NodeStore::new());
        let mut b = State::new(Arc::clone(&store_b), cairn_primitives::constants::EMPTY_ROOT);
        b.add_balance(addr(2), U256::from(2u64)).unwrap();
        b.add_balance(addr(1), U256::from(1u64)).unwrap();
        let root_b = b.commit().unwrap();

        assert_eq!(root_a, root_b);
    }

    #[test]
    fn storage_commits_into_account_root() {
        let store = Arc::new(NodeStore::new());
        let mut state = State::new(Arc::clone(&store), cairn_primitives::constants::EMPTY_ROOT);
        state.add_balance(addr(1), U256::from(1u64)).unwrap();
        state.set_storage(addr(1), H256::repeat_byte(7), U256::from(42u64)).unwrap();
        let root = state.commit().unwrap();

        let view = State::new(store, root);
        assert_eq!(view.get_storage(addr(1), H256::repeat_byte(7)).unwrap(), U256::from(42u64));
        assert_ne!(
            view.basic_account(addr(1)).unwrap().unwrap().storage_root,
            cairn_primitives::constants::EMPTY_ROOT
        );
    }

    #[test]
    fn genesis_root_is_deterministic() {
        let alloc = vec![
            GenesisAccount { address: addr(1), balance: U256::from(100u64) },
            GenesisAccount { address: addr(2), balance: U256::from(200u64) },
        ];
        let a = genesis_state_root(&Arc::new(NodeStore::new()), &alloc).unwrap();
        let b = genesis_state_root(&Arc::new(NodeStore::new()), &alloc).unwrap();
        assert_eq!(a, b);
    }
}
