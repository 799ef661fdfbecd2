//! Content-addressed code persistence

use crate::error::{StateError, StateResult};
use crate::kv::{cf, KeyValueStore};
use std::sync::Arc;
use vesta_primitives::{keccak256, H256, EMPTY_CODE_HASH};

/// Stores contract code by its keccak hash
#[derive(Clone)]
pub struct CodeStore {
    store: Arc<dyn KeyValueStore>,
}

impl CodeStore {
    /// Create a code store over a key-value backend
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist code and return its hash
    pub fn insert(&self, code: &[u8]) -> StateResult<H256> {
        if code.is_empty() {
            return Ok(EMPTY_CODE_HASH);
        }
        let hash = keccak256(code);
        if self.store.get(cf::CODE, hash.as_bytes())?.is_none() {
            self.store.put(cf::CODE, hash.as_bytes(), code)?;
        }
        Ok(hash)
    }

    /// Load code by hash
    pub fn get(&self, hash: &H256) -> StateResult<Vec<u8>> {
        if *hash == EMPTY_CODE_HASH {
            return Ok(Vec::new());
        }
        self.store
            .get(cf::CODE, hash.as_bytes())?
            .ok_or(StateError::MissingCode(*hash))
    }
}
