//! Journaled account state
//!
//! [`StateStore`] layers two caches over a [`Trie`] root:
//!
//! - a clean read cache holding accounts exactly as committed under
//!   `state_root`; restores never touch it
//! - pending writes, journaled per address so that any checkpoint can be
//!   restored
//!
//! Nothing reaches the tree until [`StateStore::commit`].

use crate::account::Account;
use crate::error::{StateError, StateResult};
use crate::journal::{Checkpoint, Journal, START_CAPACITY};
use crate::trie::{Trie, TrieChanges};
use std::collections::HashMap;
use std::sync::Arc;
use vesta_primitives::{Address, H256, U256, EMPTY_CODE_HASH, EMPTY_TRIE_ROOT};

/// Account-level view with checkpoint / restore / commit
pub struct StateStore {
    trie: Arc<dyn Trie>,
    state_root: H256,
    /// Accounts as committed under `state_root` (`None` = absent)
    clean: HashMap<Address, Option<Account>>,
    /// Uncommitted accounts (`None` = deleted)
    pending: HashMap<Address, Option<Account>>,
    /// Pending entry each address had before its first write in a span
    journal: Journal<Address, Option<Option<Account>>>,
}

impl StateStore {
    /// Open a view of the tree at `state_root`
    pub fn new(trie: Arc<dyn Trie>, state_root: H256) -> Self {
        Self {
            trie,
            state_root,
            clean: HashMap::new(),
            pending: HashMap::with_capacity(START_CAPACITY),
            journal: Journal::new(),
        }
    }

    /// Empty state
    pub fn empty(trie: Arc<dyn Trie>) -> Self {
        Self::new(trie, EMPTY_TRIE_ROOT)
    }

    /// Root after the last commit; pending writes are not reflected
    pub fn state_root(&self) -> H256 {
        self.state_root
    }

    /// Shared tree handle
    pub fn trie(&self) -> &Arc<dyn Trie> {
        &self.trie
    }

    /// Whether any account write is awaiting commit
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    // ==================== Checkpoints ====================

    /// Open a rollback boundary
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.journal.checkpoint()
    }

    /// Undo every account write made at or after `checkpoint`
    pub fn restore(&mut self, checkpoint: Checkpoint) -> StateResult<()> {
        let pending = &mut self.pending;
        self.journal
            .restore(checkpoint, |address, previous| match previous {
                Some(value) => {
                    pending.insert(address, value);
                }
                None => {
                    pending.remove(&address);
                }
            })?;
        Ok(())
    }

    // ==================== Reads ====================

    /// Current account, pending writes first
    pub fn account(&mut self, address: &Address) -> StateResult<Option<Account>> {
        if let Some(value) = self.pending.get(address) {
            return Ok(*value);
        }
        self.committed_account(address)
    }

    /// Account as of the last commit
    pub fn committed_account(&mut self, address: &Address) -> StateResult<Option<Account>> {
        if let Some(value) = self.clean.get(address) {
            return Ok(*value);
        }
        let value = match self.trie.read(&self.state_root, address.as_bytes())? {
            Some(raw) => Some(rlp::decode::<Account>(&raw)?),
            None => None,
        };
        self.clean.insert(*address, value);
        Ok(value)
    }

    /// Whether the account exists
    pub fn account_exists(&mut self, address: &Address) -> StateResult<bool> {
        Ok(self.account(address)?.is_some())
    }

    /// Absent, or present and empty
    pub fn is_dead_account(&mut self, address: &Address) -> StateResult<bool> {
        Ok(self.account(address)?.map_or(true, |a| a.is_empty()))
    }

    /// Present and empty
    pub fn is_empty_account(&mut self, address: &Address) -> StateResult<bool> {
        Ok(self.account(address)?.is_some_and(|a| a.is_empty()))
    }

    /// Balance (zero when absent)
    pub fn get_balance(&mut self, address: &Address) -> StateResult<U256> {
        Ok(self.account(address)?.map_or_else(U256::zero, |a| a.balance))
    }

    /// Nonce (zero when absent)
    pub fn get_nonce(&mut self, address: &Address) -> StateResult<u64> {
        Ok(self.account(address)?.map_or(0, |a| a.nonce))
    }

    /// Code hash (empty-code hash when absent)
    pub fn get_code_hash(&mut self, address: &Address) -> StateResult<H256> {
        Ok(self.account(address)?.map_or(EMPTY_CODE_HASH, |a| a.code_hash))
    }

    /// Storage root (empty-tree root when absent)
    pub fn get_storage_root(&mut self, address: &Address) -> StateResult<H256> {
        Ok(self.account(address)?.map_or(EMPTY_TRIE_ROOT, |a| a.storage_root))
    }

    // ==================== Writes ====================

    fn write(&mut self, address: Address, value: Option<Account>) {
        if !self.journal.is_recorded(&address) {
            let previous = self.pending.get(&address).copied();
            self.journal.record(address, previous);
        }
        self.pending.insert(address, value);
    }

    /// Credit `value`, creating the account when it does not exist.
    ///
    /// Crediting zero to an absent account is a no-op.
    pub fn add_to_balance(&mut self, address: &Address, value: U256) -> StateResult<()> {
        match self.account(address)? {
            None if value.is_zero() => {}
            None => self.write(*address, Some(Account::with_balance(value))),
            Some(mut account) => {
                account.balance = account.balance.checked_add(value).ok_or(
                    StateError::BalanceOverflow {
                        address: *address,
                        balance: account.balance,
                        value,
                    },
                )?;
                self.write(*address, Some(account));
            }
        }
        Ok(())
    }

    /// Debit `value`; fails without side effects if the balance is short
    pub fn subtract_from_balance(&mut self, address: &Address, value: U256) -> StateResult<()> {
        let current = self.account(address)?;
        let available = current.map_or_else(U256::zero, |a| a.balance);
        if available < value {
            return Err(StateError::InsufficientBalance {
                address: *address,
                required: value,
                available,
            });
        }
        if let Some(mut account) = current {
            account.balance = available - value;
            self.write(*address, Some(account));
        }
        Ok(())
    }

    /// Debit up to `value` for internal adjustments, stopping at zero.
    ///
    /// Returns the amount actually debited. Absent accounts are left alone.
    pub fn subtract_from_balance_saturating(
        &mut self,
        address: &Address,
        value: U256,
    ) -> StateResult<U256> {
        let Some(mut account) = self.account(address)? else {
            return Ok(U256::zero());
        };
        let debited = value.min(account.balance);
        account.balance -= debited;
        self.write(*address, Some(account));
        Ok(debited)
    }

    /// Bump the nonce, creating the account if needed; returns the old nonce
    pub fn increment_nonce(&mut self, address: &Address) -> StateResult<u64> {
        let mut account = self.account(address)?.unwrap_or_default();
        let previous = account.nonce;
        account.nonce = previous.saturating_add(1);
        self.write(*address, Some(account));
        Ok(previous)
    }

    /// Create a fresh account; fails if a non-empty account is already there
    pub fn create_account(&mut self, address: &Address, balance: U256) -> StateResult<()> {
        if let Some(existing) = self.account(address)? {
            if !existing.is_empty() {
                return Err(StateError::AccountAlreadyExists(*address));
            }
        }
        self.write(*address, Some(Account::with_balance(balance)));
        Ok(())
    }

    /// Mark the account deleted; it leaves the tree at commit
    pub fn delete_account(&mut self, address: &Address) {
        self.write(*address, None);
    }

    /// Record an access that may make an empty account eligible for cleanup
    pub fn touch(&mut self, address: &Address) -> StateResult<()> {
        if let Some(account) = self.account(address)? {
            self.write(*address, Some(account));
        }
        Ok(())
    }

    /// Overwrite the balance, creating the account if needed
    pub fn set_balance(&mut self, address: &Address, balance: U256) -> StateResult<()> {
        let mut account = self.account(address)?.unwrap_or_default();
        account.balance = balance;
        self.write(*address, Some(account));
        Ok(())
    }

    /// Overwrite the nonce, creating the account if needed
    pub fn set_nonce(&mut self, address: &Address, nonce: u64) -> StateResult<()> {
        let mut account = self.account(address)?.unwrap_or_default();
        account.nonce = nonce;
        self.write(*address, Some(account));
        Ok(())
    }

    /// Set the code hash of an existing account
    pub fn set_code_hash(&mut self, address: &Address, code_hash: H256) -> StateResult<()> {
        let mut account = self.account(address)?.unwrap_or_default();
        account.code_hash = code_hash;
        self.write(*address, Some(account));
        Ok(())
    }

    /// Point the account at a new storage root
    pub fn set_storage_root(&mut self, address: &Address, storage_root: H256) -> StateResult<()> {
        let mut account = self.account(address)?.unwrap_or_default();
        account.storage_root = storage_root;
        self.write(*address, Some(account));
        Ok(())
    }

    // ==================== Commit ====================

    /// Flatten pending accounts into the tree and return the new root.
    ///
    /// With `remove_empty_accounts`, accounts that end up empty are deleted.
    pub fn commit(&mut self, remove_empty_accounts: bool) -> StateResult<H256> {
        if self.pending.is_empty() {
            self.journal.commit_all();
            return Ok(self.state_root);
        }

        let mut changes = TrieChanges::new();
        let mut written = Vec::with_capacity(self.pending.len());
        for (address, value) in self.pending.drain() {
            let value = value.filter(|a| !(remove_empty_accounts && a.is_empty()));
            changes.insert(
                address.as_bytes().to_vec(),
                value.map(|a| rlp::encode(&a).to_vec()),
            );
            written.push((address, value));
        }

        let count = written.len();
        let new_root = self.trie.write_batch(&self.state_root, changes)?;
        self.clean.extend(written);
        self.state_root = new_root;
        self.journal.commit_all();

        tracing::debug!(accounts = count, root = %new_root, "state committed");
        Ok(new_root)
    }

    /// Drop the clean cache, pending writes and journal
    pub fn clear_caches(&mut self) {
        self.clean.clear();
        self.pending.clear();
        self.journal.reset();
    }

    /// Repoint this view at another root, dropping all caches
    pub fn set_state_root(&mut self, state_root: H256) {
        self.clear_caches();
        self.state_root = state_root;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryDb;
    use crate::trie::FlatTrie;

    fn store() -> StateStore {
        StateStore::empty(Arc::new(FlatTrie::new(Arc::new(MemoryDb::new()))))
    }

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_absent_account_defaults() {
        let mut state = store();
        let a = addr(1);
        assert!(!state.account_exists(&a).unwrap());
        assert!(state.is_dead_account(&a).unwrap());
        assert!(!state.is_empty_account(&a).unwrap());
        assert_eq!(state.get_balance(&a).unwrap(), U256::zero());
        assert_eq!(state.get_nonce(&a).unwrap(), 0);
        assert_eq!(state.get_code_hash(&a).unwrap(), EMPTY_CODE_HASH);
        assert_eq!(state.get_storage_root(&a).unwrap(), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn test_balance_updates() {
        let mut state = store();
        let a = addr(1);
        state.add_to_balance(&a, U256::from(100u64)).unwrap();
        state.subtract_from_balance(&a, U256::from(30u64)).unwrap();
        assert_eq!(state.get_balance(&a).unwrap(), U256::from(70u64));
    }

    #[test]
    fn test_subtract_insufficient() {
        let mut state = store();
        let a = addr(1);
        state.add_to_balance(&a, U256::from(10u64)).unwrap();
        let result = state.subtract_from_balance(&a, U256::from(11u64));
        assert!(matches!(result, Err(StateError::InsufficientBalance { .. })));
        assert_eq!(state.get_balance(&a).unwrap(), U256::from(10u64));
    }

    #[test]
    fn test_add_overflow_rejected() {
        let mut state = store();
        let a = addr(1);
        state.add_to_balance(&a, U256::MAX - 5).unwrap();
        let cp = state.checkpoint();
        let result = state.add_to_balance(&a, U256::from(6u64));
        assert!(matches!(result, Err(StateError::BalanceOverflow { .. })));
        assert_eq!(state.get_balance(&a).unwrap(), U256::MAX - 5);

        state.add_to_balance(&a, U256::from(5u64)).unwrap();
        assert_eq!(state.get_balance(&a).unwrap(), U256::MAX);
        state.restore(cp).unwrap();
        assert_eq!(state.get_balance(&a).unwrap(), U256::MAX - 5);
    }

    #[test]
    fn test_saturating_subtract() {
        let mut state = store();
        let a = addr(1);
        state.add_to_balance(&a, U256::from(10u64)).unwrap();

        let cp = state.checkpoint();
        let debited = state
            .subtract_from_balance_saturating(&a, U256::from(25u64))
            .unwrap();
        assert_eq!(debited, U256::from(10u64));
        assert_eq!(state.get_balance(&a).unwrap(), U256::zero());
        assert!(state.account_exists(&a).unwrap());

        state.restore(cp).unwrap();
        assert_eq!(state.get_balance(&a).unwrap(), U256::from(10u64));

        let absent = addr(2);
        assert_eq!(
            state
                .subtract_from_balance_saturating(&absent, U256::one())
                .unwrap(),
            U256::zero()
        );
        assert!(!state.account_exists(&absent).unwrap());
    }

    #[test]
    fn test_set_balance_overwrites() {
        let mut state = store();
        let a = addr(1);
        state.set_balance(&a, U256::zero()).unwrap();
        assert!(state.account_exists(&a).unwrap());

        state.add_to_balance(&a, U256::from(40u64)).unwrap();
        state.set_balance(&a, U256::from(7u64)).unwrap();
        state.set_balance(&a, U256::from(7u64)).unwrap();
        assert_eq!(state.get_balance(&a).unwrap(), U256::from(7u64));
    }

    #[test]
    fn test_add_zero_to_absent_is_noop() {
        let mut state = store();
        state.add_to_balance(&addr(1), U256::zero()).unwrap();
        assert!(!state.has_pending_changes());
    }

    #[test]
    fn test_increment_nonce() {
        let mut state = store();
        let a = addr(1);
        assert_eq!(state.increment_nonce(&a).unwrap(), 0);
        assert_eq!(state.increment_nonce(&a).unwrap(), 1);
        assert_eq!(state.get_nonce(&a).unwrap(), 2);

        state.set_nonce(&a, 9).unwrap();
        assert_eq!(state.increment_nonce(&a).unwrap(), 9);
    }

    #[test]
    fn test_create_account_collision() {
        let mut state = store();
        let a = addr(1);
        state.create_account(&a, U256::from(5u64)).unwrap();
        assert!(matches!(
            state.create_account(&a, U256::zero()),
            Err(StateError::AccountAlreadyExists(_))
        ));

        // An empty account may be replaced
        let b = addr(2);
        state.create_account(&b, U256::zero()).unwrap();
        state.create_account(&b, U256::from(1u64)).unwrap();
        assert_eq!(state.get_balance(&b).unwrap(), U256::one());
    }

    #[test]
    fn test_restore_nested() {
        let mut state = store();
        let a = addr(1);
        state.add_to_balance(&a, U256::from(1u64)).unwrap();
        let outer = state.checkpoint();
        state.add_to_balance(&a, U256::from(10u64)).unwrap();
        let inner = state.checkpoint();
        state.increment_nonce(&a).unwrap();
        state.add_to_balance(&a, U256::from(100u64)).unwrap();

        state.restore(inner).unwrap();
        assert_eq!(state.get_balance(&a).unwrap(), U256::from(11u64));
        assert_eq!(state.get_nonce(&a).unwrap(), 0);

        state.restore(outer).unwrap();
        assert_eq!(state.get_balance(&a).unwrap(), U256::from(1u64));

        state.restore(Checkpoint::Origin).unwrap();
        assert!(!state.account_exists(&a).unwrap());
    }

    #[test]
    fn test_root_unchanged_until_commit() {
        let mut state = store();
        state.add_to_balance(&addr(1), U256::one()).unwrap();
        assert_eq!(state.state_root(), EMPTY_TRIE_ROOT);

        let root = state.commit(false).unwrap();
        assert_ne!(root, EMPTY_TRIE_ROOT);
        assert_eq!(state.state_root(), root);
    }

    #[test]
    fn test_delete_removed_at_commit() {
        let mut state = store();
        let a = addr(1);
        state.add_to_balance(&a, U256::one()).unwrap();
        state.commit(false).unwrap();

        state.delete_account(&a);
        assert!(!state.account_exists(&a).unwrap());
        let root = state.commit(false).unwrap();
        assert_eq!(root, EMPTY_TRIE_ROOT);
    }

    #[test]
    fn test_delete_then_restore() {
        let mut state = store();
        let a = addr(1);
        state.add_to_balance(&a, U256::one()).unwrap();
        state.commit(false).unwrap();

        let cp = state.checkpoint();
        state.delete_account(&a);
        state.restore(cp).unwrap();
        assert_eq!(state.get_balance(&a).unwrap(), U256::one());
    }

    #[test]
    fn test_empty_cleanup() {
        let mut state = store();
        let a = addr(1);
        state.create_account(&a, U256::zero()).unwrap();
        let kept = state.commit(false).unwrap();
        assert_ne!(kept, EMPTY_TRIE_ROOT);

        state.touch(&a).unwrap();
        let cleaned = state.commit(true).unwrap();
        assert_eq!(cleaned, EMPTY_TRIE_ROOT);
        assert!(!state.account_exists(&a).unwrap());
    }

    #[test]
    fn test_commit_same_content_same_root() {
        let mut s1 = store();
        let mut s2 = store();
        s1.add_to_balance(&addr(1), U256::from(5u64)).unwrap();
        s1.add_to_balance(&addr(2), U256::from(6u64)).unwrap();
        s2.add_to_balance(&addr(2), U256::from(6u64)).unwrap();
        s2.add_to_balance(&addr(1), U256::from(5u64)).unwrap();
        assert_eq!(s1.commit(false).unwrap(), s2.commit(false).unwrap());
    }

    #[test]
    fn test_set_state_root_reads_history() {
        let mut state = store();
        let a = addr(1);
        state.add_to_balance(&a, U256::from(1u64)).unwrap();
        let r1 = state.commit(false).unwrap();
        state.add_to_balance(&a, U256::from(1u64)).unwrap();
        state.commit(false).unwrap();

        state.set_state_root(r1);
        assert_eq!(state.get_balance(&a).unwrap(), U256::from(1u64));
    }
}
