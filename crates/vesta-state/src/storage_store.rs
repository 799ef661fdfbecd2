//! Journaled per-account storage
//!
//! Slots are keyed by `(address, index)`. Reads resolve the account's
//! storage root through the [`StateStore`], so a store always reads under
//! the root the account currently points at. Clean reads are cached per
//! account together with that root and are dropped as soon as the root
//! moves.

use crate::error::StateResult;
use crate::journal::{Checkpoint, Journal, START_CAPACITY};
use crate::state_store::StateStore;
use crate::trie::{Trie, TrieChanges};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use vesta_primitives::word::{decode_word, encode_word, is_zero_value, ZERO_VALUE};
use vesta_primitives::{Address, H256, U256};

type SlotKey = (Address, H256);

/// Committed slot values of one account, valid for `root` only
#[derive(Debug)]
struct CleanSlots {
    root: H256,
    slots: HashMap<H256, Vec<u8>>,
}

impl CleanSlots {
    fn new(root: H256) -> Self {
        Self {
            root,
            slots: HashMap::new(),
        }
    }
}

/// Slot-level view with checkpoint / restore / commit
pub struct StorageStore {
    trie: Arc<dyn Trie>,
    clean: HashMap<Address, CleanSlots>,
    pending: HashMap<SlotKey, Vec<u8>>,
    journal: Journal<SlotKey, Option<Vec<u8>>>,
}

impl StorageStore {
    /// Create a store over the shared tree
    pub fn new(trie: Arc<dyn Trie>) -> Self {
        Self {
            trie,
            clean: HashMap::new(),
            pending: HashMap::with_capacity(START_CAPACITY),
            journal: Journal::new(),
        }
    }

    /// Number of slots awaiting commit
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Open a rollback boundary
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.journal.checkpoint()
    }

    /// Undo every slot write made at or after `checkpoint`.
    ///
    /// Clean reads are left alone.
    pub fn restore(&mut self, checkpoint: Checkpoint) -> StateResult<()> {
        let pending = &mut self.pending;
        self.journal
            .restore(checkpoint, |key, previous| match previous {
                Some(value) => {
                    pending.insert(key, value);
                }
                None => {
                    pending.remove(&key);
                }
            })?;
        Ok(())
    }

    /// Current value of a slot; unset slots read as `[0]`
    pub fn get(
        &mut self,
        state: &mut StateStore,
        address: &Address,
        index: &H256,
    ) -> StateResult<Vec<u8>> {
        if let Some(value) = self.pending.get(&(*address, *index)) {
            return Ok(value.clone());
        }
        let root = state.get_storage_root(address)?;
        self.committed(address, index, root)
    }

    /// Current value of a slot as a word
    pub fn get_word(
        &mut self,
        state: &mut StateStore,
        address: &Address,
        index: &H256,
    ) -> StateResult<U256> {
        Ok(decode_word(&self.get(state, address, index)?))
    }

    /// Value of a slot as of the last commit
    pub fn committed_value(
        &mut self,
        state: &mut StateStore,
        address: &Address,
        index: &H256,
    ) -> StateResult<Vec<u8>> {
        let root = state.get_storage_root(address)?;
        self.committed(address, index, root)
    }

    fn committed(&mut self, address: &Address, index: &H256, root: H256) -> StateResult<Vec<u8>> {
        let cache = self
            .clean
            .entry(*address)
            .or_insert_with(|| CleanSlots::new(root));
        if cache.root != root {
            *cache = CleanSlots::new(root);
        }
        if let Some(value) = cache.slots.get(index) {
            return Ok(value.clone());
        }

        let value = self
            .trie
            .read(&root, index.as_bytes())?
            .unwrap_or_else(|| ZERO_VALUE.to_vec());
        cache.slots.insert(*index, value.clone());
        Ok(value)
    }

    /// Write a slot; the first write per span journals the prior pending state
    pub fn set(&mut self, address: &Address, index: &H256, value: Vec<u8>) {
        let key = (*address, *index);
        if !self.journal.is_recorded(&key) {
            let previous = self.pending.get(&key).cloned();
            self.journal.record(key, previous);
        }
        self.pending.insert(key, value);
    }

    /// Write a slot from a word
    pub fn set_word(&mut self, address: &Address, index: &H256, value: U256) {
        self.set(address, index, encode_word(value));
    }

    /// Flatten pending slots into each account's storage tree.
    ///
    /// Slots are diffed against their committed values first; zero values
    /// delete the slot. Accounts without a net change keep their root, and
    /// slots of accounts that no longer exist are dropped.
    pub fn commit(&mut self, state: &mut StateStore) -> StateResult<()> {
        if self.pending.is_empty() {
            self.journal.commit_all();
            return Ok(());
        }

        let mut by_account: BTreeMap<Address, BTreeMap<H256, Vec<u8>>> = BTreeMap::new();
        for ((address, index), value) in self.pending.drain() {
            by_account.entry(address).or_default().insert(index, value);
        }

        let mut updated = 0usize;
        for (address, slots) in by_account {
            if !state.account_exists(&address)? {
                self.clean.remove(&address);
                continue;
            }

            let root = state.get_storage_root(&address)?;
            let mut changes = TrieChanges::new();
            for (index, value) in &slots {
                let committed = self.committed(&address, index, root)?;
                let unchanged = if is_zero_value(value) {
                    is_zero_value(&committed)
                } else {
                    committed == *value
                };
                if unchanged {
                    continue;
                }
                let change = (!is_zero_value(value)).then(|| value.clone());
                changes.insert(index.as_bytes().to_vec(), change);
            }
            if changes.is_empty() {
                continue;
            }

            let new_root = self.trie.write_batch(&root, changes)?;
            state.set_storage_root(&address, new_root)?;

            let cache = self
                .clean
                .entry(address)
                .or_insert_with(|| CleanSlots::new(new_root));
            cache.root = new_root;
            for (index, value) in slots {
                let value = if is_zero_value(&value) {
                    ZERO_VALUE.to_vec()
                } else {
                    value
                };
                cache.slots.insert(index, value);
            }
            updated += 1;
        }

        self.journal.commit_all();
        tracing::debug!(accounts = updated, "storage committed");
        Ok(())
    }

    /// Drop pending writes, the clean cache and the journal
    pub fn clear_caches(&mut self) {
        self.clean.clear();
        self.pending.clear();
        self.journal.reset();
    }
}
