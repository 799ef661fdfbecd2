//! Genesis allocation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vesta_primitives::{serde_hex, Address, H256, U256};

use crate::error::ExecutionResult;
use crate::world::WorldState;

/// Initial state of one account
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisAccount {
    /// Balance
    pub balance: U256,
    /// Nonce
    pub nonce: u64,
    /// Code
    #[serde(with = "serde_hex")]
    pub code: Vec<u8>,
    /// Storage slots
    pub storage: BTreeMap<H256, U256>,
}

/// Initial world state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    /// Allocations by address
    #[serde(default)]
    pub accounts: BTreeMap<Address, GenesisAccount>,
}

impl Genesis {
    /// Write every allocation and commit, returning the genesis root.
    ///
    /// Balances and nonces are overwritten, so applying the same allocation
    /// twice leaves the state unchanged.
    pub fn apply(&self, world: &mut WorldState) -> ExecutionResult<H256> {
        for (address, account) in &self.accounts {
            let state = world.state();
            state.set_balance(address, account.balance)?;
            state.set_nonce(address, account.nonce)?;
            if !account.code.is_empty() {
                world.set_code(address, account.code.clone())?;
            }
            for (index, value) in &account.storage {
                world.set_storage(address, index, *value);
            }
        }
        let root = world.commit(false)?;
        tracing::debug!(accounts = self.accounts.len(), %root, "genesis applied");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vesta_evm::CodeCache;
    use vesta_primitives::{keccak256, EMPTY_TRIE_ROOT};
    use vesta_state::{CodeStore, FlatTrie, MemoryDb};

    fn world() -> WorldState {
        let db = Arc::new(MemoryDb::new());
        WorldState::new(
            Arc::new(FlatTrie::new(db.clone())),
            CodeStore::new(db),
            Arc::new(CodeCache::default()),
            EMPTY_TRIE_ROOT,
        )
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "accounts": {
                "0x00000000000000000000000000000000000000aa": {
                    "balance": "0x64",
                    "nonce": 2,
                    "code": "0x6000",
                    "storage": {
                        "0x0000000000000000000000000000000000000000000000000000000000000001": "0x07"
                    }
                },
                "0x00000000000000000000000000000000000000bb": {}
            }
        }"#;
        let genesis: Genesis = serde_json::from_str(json).unwrap();
        let a = &genesis.accounts[&Address::from_low_u64(0xaa)];
        assert_eq!(a.balance, U256::from(100));
        assert_eq!(a.nonce, 2);
        assert_eq!(a.code, vec![0x60, 0x00]);
        assert_eq!(a.storage[&H256::from_word(U256::one())], U256::from(7));
        assert_eq!(
            genesis.accounts[&Address::from_low_u64(0xbb)],
            GenesisAccount::default()
        );
    }

    #[test]
    fn test_apply() {
        let a = Address::from_low_u64(0xaa);
        let b = Address::from_low_u64(0xbb);
        let mut genesis = Genesis::default();
        genesis.accounts.insert(
            a,
            GenesisAccount {
                balance: U256::from(100),
                nonce: 2,
                code: vec![0x60, 0x00],
                storage: BTreeMap::from([(H256::ZERO, U256::from(9))]),
            },
        );
        genesis.accounts.insert(b, GenesisAccount::default());

        let mut world = world();
        let root = genesis.apply(&mut world).unwrap();
        assert_ne!(root, EMPTY_TRIE_ROOT);
        assert_eq!(world.state().get_balance(&a).unwrap(), U256::from(100));
        assert_eq!(world.state().get_nonce(&a).unwrap(), 2);
        assert_eq!(world.state().get_code_hash(&a).unwrap(), keccak256(&[0x60, 0x00]));
        assert_eq!(world.storage(&a, &H256::ZERO).unwrap(), U256::from(9));
        assert!(world.state().account_exists(&b).unwrap());

        // Same allocation, same root
        assert_eq!(genesis.apply(&mut super::tests::world()).unwrap(), root);
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let a = Address::from_low_u64(0xaa);
        let mut genesis = Genesis::default();
        genesis.accounts.insert(
            a,
            GenesisAccount {
                balance: U256::from(100),
                nonce: 1,
                ..Default::default()
            },
        );

        let mut world = world();
        let root = genesis.apply(&mut world).unwrap();
        assert_eq!(genesis.apply(&mut world).unwrap(), root);
        assert_eq!(world.state().get_balance(&a).unwrap(), U256::from(100));
        assert_eq!(world.state().get_nonce(&a).unwrap(), 1);
    }
}
