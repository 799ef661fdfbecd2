//! Engine facade
//!
//! [`Engine`] owns the shared resources (key-value backend, tree, code store
//! and code cache), the live [`WorldState`] and the [`BlockProcessor`]. The
//! head root and the recent block hashes are persisted after genesis and
//! after every processed block, so reopening a RocksDB-backed engine resumes
//! where it stopped. The genesis root is recorded once; applying a genesis to
//! an initialized store only checks that it matches.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use vesta_evm::CodeCache;
use vesta_primitives::{H256, EMPTY_TRIE_ROOT};
use vesta_state::kv::cf;
use vesta_state::{
    CodeStore, Database, FlatTrie, KeyValueStore, MemoryDb, StateError, Trie, WriteBatch,
};

use crate::block::{Block, BlockHashes, BlockOutcome, BlockProcessor};
use crate::config::EngineConfig;
use crate::error::{ExecutionError, ExecutionResult};
use crate::genesis::Genesis;
use crate::query::StateQuery;
use crate::world::WorldState;

/// META key holding the head state root
const HEAD_KEY: &[u8] = b"head";
/// META key holding the genesis state root
const GENESIS_KEY: &[u8] = b"genesis";
/// META key holding the RLP list of recent block hashes
const HASHES_KEY: &[u8] = b"hashes";

/// Execution engine over one key-value backend
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn KeyValueStore>,
    database: Option<Database>,
    trie: Arc<dyn Trie>,
    code: CodeStore,
    code_cache: Arc<CodeCache>,
    world: WorldState,
    processor: BlockProcessor,
}

impl Engine {
    /// Open an engine: RocksDB under `config.data_dir`, in memory otherwise
    pub fn open(config: EngineConfig) -> ExecutionResult<Self> {
        let (store, database): (Arc<dyn KeyValueStore>, Option<Database>) = match &config.data_dir
        {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(StateError::from)?;
                let db = Database::open_at(dir)?;
                (Arc::new(db.clone()), Some(db))
            }
            None => (Arc::new(MemoryDb::new()), None),
        };

        let head = read_root(store.as_ref(), HEAD_KEY)?.unwrap_or(EMPTY_TRIE_ROOT);
        let hashes: BlockHashes = match store.get(cf::META, HASHES_KEY)? {
            Some(bytes) => rlp::decode(&bytes).map_err(StateError::from)?,
            None => BlockHashes::default(),
        };

        let trie: Arc<dyn Trie> = Arc::new(FlatTrie::new(Arc::clone(&store)));
        let code = CodeStore::new(Arc::clone(&store));
        let code_cache = Arc::new(CodeCache::new(config.code_cache_capacity));
        let world = WorldState::new(
            Arc::clone(&trie),
            code.clone(),
            Arc::clone(&code_cache),
            head,
        );
        let processor =
            BlockProcessor::new(config.forks.clone(), config.chain_id).with_hashes(hashes);

        tracing::info!(
            head = %head,
            number = ?processor.hashes().latest().map(|(n, _)| n),
            persistent = database.is_some(),
            chain_id = config.chain_id,
            "engine opened"
        );

        Ok(Self {
            config,
            store,
            database,
            trie,
            code,
            code_cache,
            world,
            processor,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current head root
    pub fn state_root(&self) -> H256 {
        self.world.state_root()
    }

    /// Shared code cache
    pub fn code_cache(&self) -> &Arc<CodeCache> {
        &self.code_cache
    }

    /// Live world state
    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    /// Block processor
    pub fn processor(&self) -> &BlockProcessor {
        &self.processor
    }

    /// Number of the last processed block, if any
    pub fn head_number(&self) -> Option<u64> {
        self.processor.hashes().latest().map(|(number, _)| number)
    }

    /// Genesis root recorded in the store, if it was initialized
    pub fn genesis_root(&self) -> ExecutionResult<Option<H256>> {
        read_root(self.store.as_ref(), GENESIS_KEY)
    }

    /// Initialize the store from a genesis allocation.
    ///
    /// On a store that already has a genesis the head is left alone; the
    /// allocation is only checked against the recorded root and
    /// [`ExecutionError::GenesisMismatch`] is returned if it differs.
    pub fn apply_genesis(&mut self, genesis: &Genesis) -> ExecutionResult<H256> {
        if let Some(stored) = self.genesis_root()? {
            let mut scratch = WorldState::new(
                Arc::clone(&self.trie),
                self.code.clone(),
                Arc::clone(&self.code_cache),
                EMPTY_TRIE_ROOT,
            );
            let provided = genesis.apply(&mut scratch)?;
            if provided != stored {
                return Err(ExecutionError::GenesisMismatch { stored, provided });
            }
            tracing::info!(genesis = %stored, head = %self.state_root(), "genesis already applied");
            return Ok(stored);
        }

        let root = genesis.apply(&mut self.world)?;
        let mut batch = WriteBatch::new();
        batch.put(cf::META, GENESIS_KEY, root.as_bytes());
        batch.put(cf::META, HEAD_KEY, root.as_bytes());
        self.store.write_batch(batch)?;
        Ok(root)
    }

    /// Process a block and advance the head
    pub fn process_block(
        &mut self,
        block: &Block,
        cancel: &AtomicBool,
    ) -> ExecutionResult<BlockOutcome> {
        let outcome = self.processor.process(&mut self.world, block, cancel)?;
        let mut batch = WriteBatch::new();
        batch.put(cf::META, HEAD_KEY, outcome.state_root.as_bytes());
        batch.put(cf::META, HASHES_KEY, &rlp::encode(self.processor.hashes()));
        self.store.write_batch(batch)?;
        Ok(outcome)
    }

    /// Read-only view at `root`, independent of the live world
    pub fn query(&self, root: H256) -> StateQuery {
        StateQuery::new(
            Arc::clone(&self.trie),
            self.code.clone(),
            Arc::clone(&self.code_cache),
            root,
        )
    }

    /// Read-only view at the current head
    pub fn query_head(&self) -> StateQuery {
        self.query(self.state_root())
    }

    /// Release the backend; later reads through outstanding queries fail
    pub fn close(self) {
        if let Some(db) = &self.database {
            db.close();
        }
        tracing::info!(head = %self.world.state_root(), "engine closed");
    }
}

fn read_root(store: &dyn KeyValueStore, key: &[u8]) -> ExecutionResult<Option<H256>> {
    match store.get(cf::META, key)? {
        Some(bytes) => {
            let root = H256::from_slice(&bytes).map_err(|e| StateError::Decode(e.to_string()))?;
            Ok(Some(root))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Transaction;
    use crate::genesis::GenesisAccount;
    use vesta_primitives::{Address, U256};

    fn genesis() -> Genesis {
        let mut genesis = Genesis::default();
        genesis.accounts.insert(
            Address::from_low_u64(1),
            GenesisAccount {
                balance: U256::from(1_000_000u64),
                ..Default::default()
            },
        );
        genesis
    }

    #[test]
    fn test_in_memory_engine() {
        let mut engine = Engine::open(EngineConfig::default()).unwrap();
        assert_eq!(engine.state_root(), EMPTY_TRIE_ROOT);

        let root = engine.apply_genesis(&genesis()).unwrap();
        assert_eq!(engine.state_root(), root);

        let mut block = Block::default();
        block.header.number = 1;
        block.header.gas_limit = engine.config().block_gas_limit;
        block.transactions.push(Transaction {
            sender: Address::from_low_u64(1),
            to: Some(Address::from_low_u64(2)),
            nonce: 0,
            value: U256::from(5),
            data: Vec::new(),
            gas_limit: 21_000,
            gas_price: U256::zero(),
        });
        let outcome = engine
            .process_block(&block, &AtomicBool::new(false))
            .unwrap();

        let mut head = engine.query_head();
        assert_eq!(head.state_root(), outcome.state_root);
        assert_eq!(head.balance(&Address::from_low_u64(2)).unwrap(), U256::from(5));

        let mut before = engine.query(root);
        assert!(!before.account_exists(&Address::from_low_u64(2)).unwrap());
        assert_eq!(engine.head_number(), Some(1));
    }

    #[test]
    fn test_genesis_recorded_once() {
        let mut engine = Engine::open(EngineConfig::default()).unwrap();
        assert_eq!(engine.genesis_root().unwrap(), None);
        let root = engine.apply_genesis(&genesis()).unwrap();
        assert_eq!(engine.genesis_root().unwrap(), Some(root));

        // Same allocation again: no change
        assert_eq!(engine.apply_genesis(&genesis()).unwrap(), root);
        assert_eq!(engine.state_root(), root);
        assert_eq!(
            engine.query_head().balance(&Address::from_low_u64(1)).unwrap(),
            U256::from(1_000_000u64)
        );

        let mut other = genesis();
        other.accounts.insert(Address::from_low_u64(9), GenesisAccount::default());
        let err = engine.apply_genesis(&other).unwrap_err();
        assert!(matches!(err, ExecutionError::GenesisMismatch { stored, .. } if stored == root));
        assert_eq!(engine.state_root(), root);
    }
}
