//! Code analysis
//!
//! [`AnalyzedCode`] wraps an immutable code blob together with its jump
//! table. The table is computed on the first jump query and reused for the
//! lifetime of the code. [`CodeCache`] shares analyzed code by hash between
//! frames and transactions.

use bitvec::prelude::*;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use vesta_primitives::{keccak256, H256};

use crate::opcode::Opcode;

/// Valid jump targets of a code blob.
///
/// Ordinary destinations (JUMPDEST) and subroutine entries (BEGINSUB) are
/// kept in separate sets. Bytes inside PUSH immediates are never recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JumpTable {
    jumpdests: BitVec<u8, Lsb0>,
    subroutines: BitVec<u8, Lsb0>,
}

impl JumpTable {
    /// Scan `code` once, left to right
    pub fn analyze(code: &[u8]) -> Self {
        let mut jumpdests = bitvec![u8, Lsb0; 0; code.len()];
        let mut subroutines = bitvec![u8, Lsb0; 0; code.len()];

        let mut pc = 0;
        while pc < code.len() {
            let byte = code[pc];
            if byte == Opcode::JUMPDEST as u8 {
                jumpdests.set(pc, true);
            } else if byte == Opcode::BEGINSUB as u8 {
                subroutines.set(pc, true);
            } else if (Opcode::PUSH1 as u8..=Opcode::PUSH32 as u8).contains(&byte) {
                pc += (byte - Opcode::PUSH1 as u8) as usize + 1;
            }
            pc += 1;
        }

        Self {
            jumpdests,
            subroutines,
        }
    }

    /// Whether `offset` is a recorded destination of the requested kind.
    ///
    /// Out-of-bounds offsets are never valid.
    pub fn is_valid_target(&self, offset: usize, wants_subroutine: bool) -> bool {
        let set = if wants_subroutine {
            &self.subroutines
        } else {
            &self.jumpdests
        };
        set.get(offset).is_some_and(|bit| *bit)
    }
}

/// Immutable code with a lazily built jump table
#[derive(Debug)]
pub struct AnalyzedCode {
    bytes: Vec<u8>,
    hash: H256,
    jump_table: OnceLock<JumpTable>,
}

impl AnalyzedCode {
    /// Wrap `bytes`, hashing them
    pub fn new(bytes: Vec<u8>) -> Self {
        let hash = keccak256(&bytes);
        Self::with_hash(bytes, hash)
    }

    /// Wrap `bytes` whose hash is already known
    pub fn with_hash(bytes: Vec<u8>, hash: H256) -> Self {
        Self {
            bytes,
            hash,
            jump_table: OnceLock::new(),
        }
    }

    /// The empty code
    pub fn empty() -> Self {
        Self::with_hash(Vec::new(), vesta_primitives::EMPTY_CODE_HASH)
    }

    /// Raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Code hash
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Code length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the code is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the jump table has been built yet
    pub fn is_analyzed(&self) -> bool {
        self.jump_table.get().is_some()
    }

    /// Jump table, built on first use
    pub fn jump_table(&self) -> &JumpTable {
        self.jump_table.get_or_init(|| {
            tracing::trace!(hash = %self.hash, len = self.bytes.len(), "analyzing code");
            JumpTable::analyze(&self.bytes)
        })
    }

    /// Whether `offset` is a valid target of the requested kind
    pub fn is_valid_target(&self, offset: usize, wants_subroutine: bool) -> bool {
        self.jump_table().is_valid_target(offset, wants_subroutine)
    }
}

/// Default number of code blobs kept by [`CodeCache`]
pub const DEFAULT_CODE_CACHE_CAPACITY: usize = 1024;

struct CacheInner {
    entries: HashMap<H256, Arc<AnalyzedCode>>,
    order: VecDeque<H256>,
}

/// Bounded, shared cache of analyzed code keyed by code hash.
///
/// The oldest entry is evicted first once capacity is reached. Construct one
/// per engine and hand out clones of the `Arc`.
pub struct CodeCache {
    inner: RwLock<CacheInner>,
    capacity: usize,
}

impl CodeCache {
    /// Create a cache holding at most `capacity` blobs
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Look up code by hash
    pub fn get(&self, hash: &H256) -> Option<Arc<AnalyzedCode>> {
        self.inner.read().entries.get(hash).cloned()
    }

    /// Insert code, returning the shared entry
    pub fn insert(&self, code: AnalyzedCode) -> Arc<AnalyzedCode> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.entries.get(&code.hash()) {
            return Arc::clone(existing);
        }

        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }

        let hash = code.hash();
        let code = Arc::new(code);
        inner.entries.insert(hash, Arc::clone(&code));
        inner.order.push_back(hash);
        code
    }

    /// Look up code by hash, loading and inserting it on a miss
    pub fn get_or_load<E, F>(&self, hash: &H256, load: F) -> Result<Arc<AnalyzedCode>, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        if let Some(code) = self.get(hash) {
            return Ok(code);
        }
        let bytes = load()?;
        Ok(self.insert(AnalyzedCode::with_hash(bytes, *hash)))
    }

    /// Number of cached blobs
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached blobs
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for CodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jumpdest_recorded() {
        // PUSH1 0x03 JUMP JUMPDEST STOP
        let table = JumpTable::analyze(&[0x60, 0x03, 0x56, 0x5b, 0x00]);
        assert!(table.is_valid_target(3, false));
        assert!(!table.is_valid_target(3, true));
        assert!(!table.is_valid_target(0, false));
        assert!(!table.is_valid_target(100, false));
    }

    #[test]
    fn test_push_immediate_is_not_a_target() {
        // PUSH1 0x5b, PUSH2 0x5c 0x5b
        let table = JumpTable::analyze(&[0x60, 0x5b, 0x61, 0x5c, 0x5b]);
        for offset in 0..5 {
            assert!(!table.is_valid_target(offset, false));
            assert!(!table.is_valid_target(offset, true));
        }
    }

    #[test]
    fn test_truncated_push_at_end() {
        // PUSH32 with only two immediate bytes
        let table = JumpTable::analyze(&[0x5b, 0x7f, 0x5b, 0x5b]);
        assert!(table.is_valid_target(0, false));
        assert!(!table.is_valid_target(2, false));
        assert!(!table.is_valid_target(3, false));
    }

    #[test]
    fn test_subroutine_entries_are_separate() {
        // BEGINSUB JUMPDEST BEGINSUB
        let table = JumpTable::analyze(&[0x5c, 0x5b, 0x5c]);
        assert!(table.is_valid_target(0, true));
        assert!(!table.is_valid_target(0, false));
        assert!(table.is_valid_target(1, false));
        assert!(!table.is_valid_target(1, true));
        assert!(table.is_valid_target(2, true));
    }

    #[test]
    fn test_analysis_is_lazy() {
        let code = AnalyzedCode::new(vec![0x5b]);
        assert!(!code.is_analyzed());
        assert_eq!(code.hash(), keccak256(&[0x5b]));
        assert!(code.is_valid_target(0, false));
        assert!(code.is_analyzed());
        // Repeat queries reuse the same table
        assert!(code.is_valid_target(0, false));
    }

    #[test]
    fn test_empty_code() {
        let code = AnalyzedCode::empty();
        assert!(code.is_empty());
        assert_eq!(code.hash(), vesta_primitives::EMPTY_CODE_HASH);
        assert!(!code.is_valid_target(0, false));
    }

    // ==================== CodeCache ====================

    #[test]
    fn test_cache_shares_by_hash() {
        let cache = CodeCache::new(4);
        let a = cache.insert(AnalyzedCode::new(vec![1, 2, 3]));
        let b = cache.insert(AnalyzedCode::new(vec![1, 2, 3]));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_evicts_oldest() {
        let cache = CodeCache::new(2);
        let first = cache.insert(AnalyzedCode::new(vec![1]));
        cache.insert(AnalyzedCode::new(vec![2]));
        cache.insert(AnalyzedCode::new(vec![3]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&first.hash()).is_none());
        assert!(cache.get(&keccak256(&[3])).is_some());
    }

    #[test]
    fn test_cache_get_or_load() {
        let cache = CodeCache::default();
        let hash = keccak256(&[0x00]);

        let loaded: Result<_, ()> = cache.get_or_load(&hash, || Ok(vec![0x00]));
        assert_eq!(loaded.unwrap().bytes(), &[0x00]);

        // Second lookup is served from the cache
        let cached: Result<_, ()> = cache.get_or_load(&hash, || Err(()));
        assert!(cached.is_ok());

        let missing: Result<_, &str> = cache.get_or_load(&H256::ZERO, || Err("missing"));
        assert_eq!(missing.unwrap_err(), "missing");
    }
}
