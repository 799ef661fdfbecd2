//! Journal behaviour of the account and storage stores
//!
//! Checkpoints are taken after each write, so restoring to the checkpoint
//! taken after write `k` recovers write `k`'s value, and `Checkpoint::Origin`
//! recovers the value from before the first write.

use std::sync::Arc;
use vesta_primitives::{keccak256, Address, H256, U256, EMPTY_TRIE_ROOT};
use vesta_state::{
    Checkpoint, FlatTrie, MemoryDb, StateStore, StorageStore, Trie, START_CAPACITY,
};

struct Fixture {
    state: StateStore,
    storage: StorageStore,
    address1: Address,
    address2: Address,
}

fn value(i: usize) -> Vec<u8> {
    vec![i as u8]
}

fn slot(n: u64) -> H256 {
    H256::from_word(U256::from(n))
}

fn hashed_address(seed: &[u8]) -> Address {
    Address::from_slice(&keccak256(seed).as_bytes()[12..]).unwrap()
}

/// Two empty accounts committed, and a fresh storage store
fn fixture() -> Fixture {
    let trie: Arc<dyn Trie> = Arc::new(FlatTrie::new(Arc::new(MemoryDb::new())));
    let mut state = StateStore::empty(Arc::clone(&trie));
    let address1 = hashed_address(b"1");
    let address2 = hashed_address(b"2");
    state.create_account(&address1, U256::zero()).unwrap();
    state.create_account(&address2, U256::zero()).unwrap();
    state.commit(false).unwrap();
    Fixture {
        state,
        storage: StorageStore::new(trie),
        address1,
        address2,
    }
}

impl Fixture {
    fn get(&mut self, address: Address, index: u64) -> Vec<u8> {
        self.storage
            .get(&mut self.state, &address, &slot(index))
            .unwrap()
    }

    fn set(&mut self, address: Address, index: u64, v: Vec<u8>) {
        self.storage.set(&address, &slot(index), v);
    }

    fn commit(&mut self) {
        self.storage.commit(&mut self.state).unwrap();
        self.state.commit(false).unwrap();
    }
}

// ==================== Restore ====================

#[test]
fn test_empty_commit_restore() {
    let mut fx = fixture();
    fx.storage.commit(&mut fx.state).unwrap();
    fx.storage.restore(Checkpoint::Origin).unwrap();
}

#[test]
fn test_same_slot_different_values_restore() {
    // Index k in the list below is the checkpoint taken after write k + 1
    for k in 0..3usize {
        let mut fx = fixture();
        let a = fx.address1;
        let mut checkpoints = Vec::new();
        for i in 1..=3 {
            fx.set(a, 1, value(i));
            checkpoints.push(fx.storage.checkpoint());
        }
        fx.storage.restore(checkpoints[k]).unwrap();
        assert_eq!(fx.get(a, 1), value(k + 1), "checkpoint {}", k);
    }

    let mut fx = fixture();
    let a = fx.address1;
    for i in 1..=3 {
        fx.set(a, 1, value(i));
        fx.storage.checkpoint();
    }
    fx.storage.restore(Checkpoint::Origin).unwrap();
    assert_eq!(fx.get(a, 1), value(0));
}

#[test]
fn test_writes_without_checkpoint_restore_to_original() {
    let mut fx = fixture();
    let a = fx.address1;
    let cp = fx.storage.checkpoint();
    fx.set(a, 1, value(1));
    fx.set(a, 1, value(2));
    fx.set(a, 1, value(3));
    fx.storage.restore(cp).unwrap();
    assert_eq!(fx.get(a, 1), value(0));
}

#[test]
fn test_same_address_different_index() {
    for k in 0..3usize {
        let mut fx = fixture();
        let a = fx.address1;
        let mut checkpoints = Vec::new();
        for i in 1..=3u64 {
            fx.set(a, i, value(i as usize));
            checkpoints.push(fx.storage.checkpoint());
        }
        fx.storage.restore(checkpoints[k]).unwrap();
        assert_eq!(fx.get(a, 1), value((k + 1).min(1)));
        assert_eq!(fx.get(a, 3), if k == 2 { value(3) } else { value(0) });
    }
}

#[test]
fn test_keep_in_cache() {
    let mut fx = fixture();
    let a = fx.address1;
    fx.set(a, 1, value(1));
    fx.storage.commit(&mut fx.state).unwrap();
    fx.get(a, 1);
    for _ in 0..3 {
        fx.set(a, 1, value(2));
        fx.storage.restore(Checkpoint::Origin).unwrap();
    }
    assert_eq!(fx.get(a, 1), value(1));
}

// ==================== Commit ====================

#[test]
fn test_commit_restore() {
    let mut fx = fixture();
    let (a1, a2) = (fx.address1, fx.address2);
    fx.set(a1, 1, value(1));
    fx.set(a1, 2, value(2));
    fx.set(a1, 3, value(3));
    fx.storage.commit(&mut fx.state).unwrap();
    fx.set(a2, 1, value(4));
    fx.set(a2, 2, value(5));
    fx.set(a2, 3, value(6));
    fx.storage.commit(&mut fx.state).unwrap();
    fx.set(a1, 1, value(7));
    fx.set(a1, 2, value(8));
    fx.set(a1, 3, value(9));
    fx.storage.commit(&mut fx.state).unwrap();
    fx.set(a2, 1, value(10));
    fx.set(a2, 2, value(11));
    fx.set(a2, 3, value(12));
    fx.storage.commit(&mut fx.state).unwrap();
    fx.storage.restore(Checkpoint::Origin).unwrap();

    assert_eq!(fx.get(a1, 1), value(7));
    assert_eq!(fx.get(a1, 2), value(8));
    assert_eq!(fx.get(a1, 3), value(9));
    assert_eq!(fx.get(a2, 1), value(10));
    assert_eq!(fx.get(a2, 2), value(11));
    assert_eq!(fx.get(a2, 3), value(12));
}

#[test]
fn test_two_commit_cycles_root_reflects_final_values() {
    let mut fx = fixture();
    let (a1, a2) = (fx.address1, fx.address2);
    fx.set(a1, 1, value(1));
    fx.set(a2, 1, value(2));
    fx.commit();
    fx.set(a1, 1, value(5));
    fx.set(a2, 1, value(6));
    fx.commit();
    let root = fx.state.state_root();

    // Same final values written in one go
    let mut direct = fixture();
    direct.set(a1, 1, value(5));
    direct.set(a2, 1, value(6));
    direct.commit();
    assert_eq!(direct.state.state_root(), root);
}

#[test]
fn test_commit_no_changes() {
    let mut fx = fixture();
    let a = fx.address1;
    fx.set(a, 1, value(1));
    fx.set(a, 2, value(2));
    fx.set(a, 3, value(3));
    fx.storage.restore(Checkpoint::Origin).unwrap();
    fx.storage.commit(&mut fx.state).unwrap();

    assert_eq!(fx.state.get_storage_root(&a).unwrap(), EMPTY_TRIE_ROOT);
}

#[test]
fn test_commit_no_changes_after_reads_and_restores() {
    let mut fx = fixture();
    let a = fx.address1;
    let empty_root = {
        let mut reference = fixture();
        reference.commit();
        reference.state.state_root()
    };

    fx.get(a, 1);
    fx.get(a, 1);
    let mut checkpoints = Vec::new();
    for i in 1..=3 {
        fx.set(a, 1, value(i));
        checkpoints.push(fx.storage.checkpoint());
    }
    for cp in checkpoints.into_iter().rev() {
        fx.storage.restore(cp).unwrap();
    }
    fx.get(a, 1);
    for i in 1..=3 {
        fx.set(a, 1, value(i));
    }
    fx.storage.restore(Checkpoint::Origin).unwrap();
    fx.get(a, 1);
    fx.commit();

    assert_eq!(fx.state.get_storage_root(&a).unwrap(), EMPTY_TRIE_ROOT);
    assert_eq!(fx.state.state_root(), empty_root);
}

#[test]
fn test_writing_zero_back_is_no_change() {
    let mut fx = fixture();
    let a = fx.address1;
    fx.set(a, 1, value(1));
    fx.set(a, 1, value(0));
    fx.storage.commit(&mut fx.state).unwrap();
    assert_eq!(fx.state.get_storage_root(&a).unwrap(), EMPTY_TRIE_ROOT);
}

#[test]
fn test_commit_clear_caches_get_previous_root() {
    let mut fx = fixture();
    let a = fx.address1;

    // block 1
    fx.set(a, 1, value(1));
    fx.commit();
    let state_root = fx.state.state_root();

    // block 2
    fx.set(a, 1, value(2));
    fx.commit();

    // revert
    fx.state.clear_caches();
    fx.storage.clear_caches();
    fx.state.set_state_root(state_root);

    assert_eq!(fx.get(a, 1), value(1));
}

// ==================== Capacity ====================

#[test]
fn test_commit_exactly_at_capacity_same_slot() {
    let mut fx = fixture();
    let a = fx.address1;
    for i in 0..START_CAPACITY {
        fx.set(a, 1, value(i % 2));
    }
    fx.commit();
    assert_eq!(fx.get(a, 1), value((START_CAPACITY + 1) % 2));
}

#[test]
fn test_commit_exactly_at_capacity_distinct_slots() {
    let mut fx = fixture();
    let a = fx.address1;
    for i in 0..START_CAPACITY as u64 {
        fx.set(a, i, (i + 1).to_be_bytes().to_vec());
        fx.storage.checkpoint();
    }
    assert_eq!(fx.storage.pending_len(), START_CAPACITY);
    fx.commit();

    for i in 0..START_CAPACITY as u64 {
        let stored = fx.get(a, i);
        assert_eq!(stored, (i + 1).to_be_bytes().to_vec(), "slot {}", i);
    }
    assert_eq!(fx.storage.pending_len(), 0);
}

#[test]
fn test_restore_past_capacity_boundary() {
    let mut fx = fixture();
    let a = fx.address1;
    let mut checkpoints = Vec::new();
    for i in 0..=START_CAPACITY as u64 {
        checkpoints.push(fx.storage.checkpoint());
        fx.set(a, i, value(1));
    }
    // Undo only the write that crossed the boundary
    let last = checkpoints[START_CAPACITY];
    fx.storage.restore(last).unwrap();
    assert_eq!(fx.storage.pending_len(), START_CAPACITY);
    assert_eq!(fx.get(a, START_CAPACITY as u64), value(0));
    assert_eq!(fx.get(a, START_CAPACITY as u64 - 1), value(1));
}

// ==================== Account journal ====================

#[test]
fn test_frame_revert_restores_accounts_and_storage() {
    let mut fx = fixture();
    let (a1, a2) = (fx.address1, fx.address2);
    fx.state.add_to_balance(&a1, U256::from(100u64)).unwrap();
    fx.set(a1, 1, value(1));

    let state_cp = fx.state.checkpoint();
    let storage_cp = fx.storage.checkpoint();
    fx.state.subtract_from_balance(&a1, U256::from(40u64)).unwrap();
    fx.state.add_to_balance(&a2, U256::from(40u64)).unwrap();
    fx.state.increment_nonce(&a1).unwrap();
    fx.set(a1, 1, value(9));
    {
        // nested frame that completes successfully
        fx.state.checkpoint();
        fx.storage.checkpoint();
        fx.set(a2, 7, value(7));
        fx.state.add_to_balance(&a2, U256::one()).unwrap();
    }
    fx.state.restore(state_cp).unwrap();
    fx.storage.restore(storage_cp).unwrap();

    assert_eq!(fx.state.get_balance(&a1).unwrap(), U256::from(100u64));
    assert_eq!(fx.state.get_balance(&a2).unwrap(), U256::zero());
    assert_eq!(fx.state.get_nonce(&a1).unwrap(), 0);
    assert_eq!(fx.get(a1, 1), value(1));
    assert_eq!(fx.get(a2, 7), value(0));
}
