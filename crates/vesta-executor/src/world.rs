//! World state seen by transactions
//!
//! [`WorldState`] bundles the account store, the slot store and code access
//! behind one checkpoint discipline. Every call frame takes a [`Snapshot`] on
//! entry and either releases it (keeping its writes) or reverts to it.

use std::sync::Arc;

use vesta_evm::{AnalyzedCode, CodeCache};
use vesta_primitives::{Address, H256, U256};
use vesta_state::{Checkpoint, CodeStore, StateError, StateResult, StateStore, StorageStore, Trie};

/// Paired checkpoints of the account and slot journals
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    state: Checkpoint,
    storage: Checkpoint,
}

/// Accounts, storage and code over one state root
pub struct WorldState {
    state: StateStore,
    storage: StorageStore,
    code: CodeStore,
    code_cache: Arc<CodeCache>,
    open_frames: usize,
}

impl WorldState {
    /// Open the world at `root`
    pub fn new(trie: Arc<dyn Trie>, code: CodeStore, code_cache: Arc<CodeCache>, root: H256) -> Self {
        Self {
            state: StateStore::new(Arc::clone(&trie), root),
            storage: StorageStore::new(trie),
            code,
            code_cache,
            open_frames: 0,
        }
    }

    /// Root after the last commit
    pub fn state_root(&self) -> H256 {
        self.state.state_root()
    }

    /// Account store
    pub fn state(&mut self) -> &mut StateStore {
        &mut self.state
    }

    /// Whether either journal holds uncommitted writes
    pub fn has_pending_changes(&self) -> bool {
        self.state.has_pending_changes() || self.storage.pending_len() > 0
    }

    /// Number of snapshots neither released nor reverted
    pub fn open_frames(&self) -> usize {
        self.open_frames
    }

    /// Shared code cache
    pub fn code_cache(&self) -> &Arc<CodeCache> {
        &self.code_cache
    }

    // ==================== Frames ====================

    /// Checkpoint both journals
    pub fn snapshot(&mut self) -> Snapshot {
        self.open_frames += 1;
        Snapshot {
            state: self.state.checkpoint(),
            storage: self.storage.checkpoint(),
        }
    }

    /// Undo everything written since `snapshot`
    pub fn revert(&mut self, snapshot: Snapshot) -> StateResult<()> {
        self.open_frames = self.open_frames.saturating_sub(1);
        self.state.restore(snapshot.state)?;
        self.storage.restore(snapshot.storage)
    }

    /// Keep everything written since `snapshot`
    pub fn release(&mut self, _snapshot: Snapshot) {
        self.open_frames = self.open_frames.saturating_sub(1);
    }

    // ==================== Storage ====================

    /// Current value of a slot
    pub fn storage(&mut self, address: &Address, index: &H256) -> StateResult<U256> {
        self.storage.get_word(&mut self.state, address, index)
    }

    /// Value of a slot at the last commit
    pub fn committed_storage(&mut self, address: &Address, index: &H256) -> StateResult<U256> {
        let raw = self.storage.committed_value(&mut self.state, address, index)?;
        Ok(vesta_primitives::word::decode_word(&raw))
    }

    /// Write a slot
    pub fn set_storage(&mut self, address: &Address, index: &H256, value: U256) {
        self.storage.set_word(address, index, value);
    }

    // ==================== Code ====================

    /// Analyzed code of an account, through the shared cache
    pub fn code(&mut self, address: &Address) -> StateResult<Arc<AnalyzedCode>> {
        let hash = self.state.get_code_hash(address)?;
        let code = &self.code;
        self.code_cache.get_or_load(&hash, || code.get(&hash))
    }

    /// Code by hash
    pub fn code_by_hash(&self, hash: &H256) -> StateResult<Arc<AnalyzedCode>> {
        let code = &self.code;
        self.code_cache.get_or_load(hash, || code.get(hash))
    }

    /// Persist code and attach it to an account
    pub fn set_code(&mut self, address: &Address, bytes: Vec<u8>) -> StateResult<H256> {
        let hash = self.code.insert(&bytes)?;
        self.state.set_code_hash(address, hash)?;
        self.code_cache.insert(AnalyzedCode::with_hash(bytes, hash));
        Ok(hash)
    }

    // ==================== Commit ====================

    /// Flush storage, then accounts, and return the new state root
    pub fn commit(&mut self, remove_empty_accounts: bool) -> StateResult<H256> {
        if self.open_frames > 0 {
            return Err(StateError::OpenFrames(self.open_frames));
        }
        self.storage.commit(&mut self.state)?;
        self.state.commit(remove_empty_accounts)
    }

    /// Drop every cache and journal and repoint at `root`
    pub fn reset_to(&mut self, root: H256) {
        self.storage.clear_caches();
        self.state.set_state_root(root);
        self.open_frames = 0;
    }
}
