//! Property tests: the storage store against a snapshot model
//!
//! Random interleavings of writes, checkpoints, restores and commits must
//! leave every slot reading exactly what a naive "copy the whole map at
//! each checkpoint" model reads.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use vesta_primitives::{Address, H256, U256};
use vesta_state::{Checkpoint, FlatTrie, MemoryDb, StateStore, StorageStore, Trie};

const SLOTS: u64 = 6;

#[derive(Clone, Debug)]
enum Op {
    Set(u64, u8),
    Checkpoint,
    /// Index into the live checkpoints, modulo their count
    Restore(usize),
    RestoreOrigin,
    Commit,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..SLOTS, 0u8..4).prop_map(|(slot, value)| Op::Set(slot, value)),
        3 => Just(Op::Checkpoint),
        2 => any::<usize>().prop_map(Op::Restore),
        1 => Just(Op::RestoreOrigin),
        1 => Just(Op::Commit),
    ]
}

type Model = HashMap<u64, u8>;

fn slot(n: u64) -> H256 {
    H256::from_word(U256::from(n))
}

fn setup() -> (StateStore, StorageStore, Address) {
    let trie: Arc<dyn Trie> = Arc::new(FlatTrie::new(Arc::new(MemoryDb::new())));
    let mut state = StateStore::empty(Arc::clone(&trie));
    let owner = Address::from_low_u64(0x51);
    state.create_account(&owner, U256::one()).unwrap();
    state.commit(false).unwrap();
    (state, StorageStore::new(trie), owner)
}

proptest! {
    #[test]
    fn storage_matches_snapshot_model(ops in proptest::collection::vec(arb_op(), 1..120)) {
        let (mut state, mut storage, owner) = setup();
        let mut committed: Model = HashMap::new();
        let mut current: Model = HashMap::new();
        let mut checkpoints: Vec<(Checkpoint, Model)> = Vec::new();

        for op in ops {
            match op {
                Op::Set(index, value) => {
                    storage.set(&owner, &slot(index), vec![value]);
                    current.insert(index, value);
                }
                Op::Checkpoint => {
                    checkpoints.push((storage.checkpoint(), current.clone()));
                }
                Op::Restore(pick) => {
                    if checkpoints.is_empty() {
                        continue;
                    }
                    let keep = pick % checkpoints.len();
                    let (checkpoint, snapshot) = checkpoints[keep].clone();
                    storage.restore(checkpoint).unwrap();
                    current = snapshot;
                    checkpoints.truncate(keep + 1);
                }
                Op::RestoreOrigin => {
                    storage.restore(Checkpoint::Origin).unwrap();
                    current = committed.clone();
                    checkpoints.clear();
                }
                Op::Commit => {
                    storage.commit(&mut state).unwrap();
                    state.commit(false).unwrap();
                    committed = current.clone();
                    checkpoints.clear();
                }
            }

            for index in 0..SLOTS {
                let expected = vec![current.get(&index).copied().unwrap_or(0)];
                let actual = storage.get(&mut state, &owner, &slot(index)).unwrap();
                prop_assert_eq!(actual, expected, "slot {}", index);
            }
        }
    }

    #[test]
    fn committed_root_depends_only_on_final_values(
        ops in proptest::collection::vec((0..SLOTS, 0u8..4), 1..60)
    ) {
        // Committing in one go or after every write ends at the same root
        let (mut state_a, mut storage_a, owner) = setup();
        let (mut state_b, mut storage_b, _) = setup();
        for (index, value) in &ops {
            storage_a.set(&owner, &slot(*index), vec![*value]);
            storage_b.set(&owner, &slot(*index), vec![*value]);
            storage_b.commit(&mut state_b).unwrap();
            state_b.commit(false).unwrap();
        }
        storage_a.commit(&mut state_a).unwrap();
        let root_a = state_a.commit(false).unwrap();
        prop_assert_eq!(root_a, state_b.state_root());
    }
}
