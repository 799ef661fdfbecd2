//! Read-only state queries at a historical root
//!
//! A [`StateQuery`] owns private account and slot caches over the shared
//! tree, so any number of queries can run on other threads while blocks are
//! being processed. Nothing it reads is ever written back.

use std::sync::Arc;

use vesta_evm::{AnalyzedCode, CodeCache};
use vesta_primitives::{word, Address, H256, U256, EMPTY_CODE_HASH};
use vesta_state::{CodeStore, StateResult, StateStore, StorageStore, Trie};

/// Read-only view of the world at one state root
pub struct StateQuery {
    state: StateStore,
    storage: StorageStore,
    code: CodeStore,
    code_cache: Arc<CodeCache>,
}

impl StateQuery {
    /// Open a view at `root`
    pub fn new(trie: Arc<dyn Trie>, code: CodeStore, code_cache: Arc<CodeCache>, root: H256) -> Self {
        Self {
            state: StateStore::new(Arc::clone(&trie), root),
            storage: StorageStore::new(trie),
            code,
            code_cache,
        }
    }

    /// Root this view reads from
    pub fn state_root(&self) -> H256 {
        self.state.state_root()
    }

    /// Repoint the view at another root
    pub fn set_state_root(&mut self, root: H256) {
        self.storage.clear_caches();
        self.state.set_state_root(root);
    }

    /// Account nonce
    pub fn nonce(&mut self, address: &Address) -> StateResult<u64> {
        self.state.get_nonce(address)
    }

    /// Account balance
    pub fn balance(&mut self, address: &Address) -> StateResult<U256> {
        self.state.get_balance(address)
    }

    /// Root of the account's slot set
    pub fn storage_root(&mut self, address: &Address) -> StateResult<H256> {
        self.state.get_storage_root(address)
    }

    /// Hash of the account's code
    pub fn code_hash(&mut self, address: &Address) -> StateResult<H256> {
        self.state.get_code_hash(address)
    }

    /// Code of an account
    pub fn code(&mut self, address: &Address) -> StateResult<Arc<AnalyzedCode>> {
        let hash = self.state.get_code_hash(address)?;
        self.code_by_hash(&hash)
    }

    /// Code by hash
    pub fn code_by_hash(&self, hash: &H256) -> StateResult<Arc<AnalyzedCode>> {
        let code = &self.code;
        self.code_cache.get_or_load(hash, || code.get(hash))
    }

    /// Whether the account has code
    pub fn is_contract(&mut self, address: &Address) -> StateResult<bool> {
        Ok(self.state.get_code_hash(address)? != EMPTY_CODE_HASH)
    }

    /// Whether the account exists
    pub fn account_exists(&mut self, address: &Address) -> StateResult<bool> {
        self.state.account_exists(address)
    }

    /// Whether the account is absent or empty
    pub fn is_dead_account(&mut self, address: &Address) -> StateResult<bool> {
        self.state.is_dead_account(address)
    }

    /// Whether the account exists and is empty
    pub fn is_empty_account(&mut self, address: &Address) -> StateResult<bool> {
        self.state.is_empty_account(address)
    }

    /// Value of a storage slot as stored
    pub fn storage(&mut self, address: &Address, index: &H256) -> StateResult<Vec<u8>> {
        self.storage.get(&mut self.state, address, index)
    }

    /// Value of a storage slot as a word
    pub fn storage_word(&mut self, address: &Address, index: &H256) -> StateResult<U256> {
        let raw = self.storage(address, index)?;
        Ok(word::decode_word(&raw))
    }
}
