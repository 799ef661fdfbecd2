//! Block processing
//!
//! Transactions of a block run strictly in order against one [`WorldState`],
//! each committed before the next starts. The only cancellation point is the
//! boundary between two transactions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use vesta_evm::{BlockContext, ForkSchedule};
use vesta_primitives::{keccak256, Address, H256, U256};

use crate::error::{ExecutionError, ExecutionResult};
use crate::executor::{Receipt, Transaction, TransactionExecutor};
use crate::world::WorldState;

/// Number of ancestors visible to BLOCKHASH
pub const BLOCK_HASH_WINDOW: usize = 256;

/// Block header fields the engine consumes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockHeader {
    /// Block number
    pub number: u64,
    /// Block timestamp
    pub timestamp: u64,
    /// Block gas limit
    pub gas_limit: u64,
    /// Fee recipient
    pub coinbase: Address,
    /// Difficulty
    pub difficulty: U256,
    /// Base fee
    pub base_fee: U256,
}

impl BlockHeader {
    /// Hash identifying the block once its post-state root is known
    pub fn hash(&self, state_root: &H256) -> H256 {
        let mut stream = RlpStream::new_list(7);
        stream.append(&self.number);
        stream.append(&self.timestamp);
        stream.append(&self.gas_limit);
        stream.append(&self.coinbase);
        stream.append(&self.difficulty);
        stream.append(&self.base_fee);
        stream.append(state_root);
        keccak256(&stream.out())
    }
}

/// A block: header plus ordered transactions
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Header
    #[serde(default)]
    pub header: BlockHeader,
    /// Transactions in execution order
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Result of a processed block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOutcome {
    /// Block number
    pub number: u64,
    /// Block hash
    pub hash: H256,
    /// One receipt per transaction
    pub receipts: Vec<Receipt>,
    /// Total gas used
    pub gas_used: u64,
    /// Post-state root
    pub state_root: H256,
}

/// Hashes of the most recent blocks
#[derive(Clone, Debug, Default)]
pub struct BlockHashes {
    recent: VecDeque<(u64, H256)>,
}

impl BlockHashes {
    /// Hash of block `number` if it is still remembered
    pub fn get(&self, number: u64) -> Option<H256> {
        self.recent
            .iter()
            .rev()
            .find(|(n, _)| *n == number)
            .map(|(_, hash)| *hash)
    }

    /// Record a block hash, forgetting the oldest past the window
    pub fn insert(&mut self, number: u64, hash: H256) {
        self.recent.push_back((number, hash));
        while self.recent.len() > BLOCK_HASH_WINDOW {
            self.recent.pop_front();
        }
    }

    /// Most recent block number and hash
    pub fn latest(&self) -> Option<(u64, H256)> {
        self.recent.back().copied()
    }

    /// Number of remembered hashes
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    /// Whether no hash is remembered
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

impl Encodable for BlockHashes {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(self.recent.len());
        for (number, hash) in &self.recent {
            s.begin_list(2);
            s.append(number);
            s.append(hash);
        }
    }
}

impl Decodable for BlockHashes {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let mut hashes = BlockHashes::default();
        for item in rlp.iter() {
            if item.item_count()? != 2 {
                return Err(DecoderError::RlpIncorrectListLen);
            }
            hashes.insert(item.val_at(0)?, item.val_at(1)?);
        }
        Ok(hashes)
    }
}

/// Runs blocks against a world state
#[derive(Debug)]
pub struct BlockProcessor {
    schedule: ForkSchedule,
    chain_id: u64,
    hashes: BlockHashes,
}

impl BlockProcessor {
    /// Create a processor for a chain
    pub fn new(schedule: ForkSchedule, chain_id: u64) -> Self {
        Self {
            schedule,
            chain_id,
            hashes: BlockHashes::default(),
        }
    }

    /// Resume with hashes remembered from earlier blocks
    pub fn with_hashes(mut self, hashes: BlockHashes) -> Self {
        self.hashes = hashes;
        self
    }

    /// Fork schedule in use
    pub fn schedule(&self) -> &ForkSchedule {
        &self.schedule
    }

    /// Recent block hashes
    pub fn hashes(&self) -> &BlockHashes {
        &self.hashes
    }

    /// Execute every transaction of `block` in order.
    ///
    /// `cancel` is checked before each transaction. On any error the world is
    /// reset to the root it had before the block, so a failed block leaves no
    /// trace.
    pub fn process(
        &mut self,
        world: &mut WorldState,
        block: &Block,
        cancel: &AtomicBool,
    ) -> ExecutionResult<BlockOutcome> {
        let pre_root = world.state_root();
        match self.run(world, block, cancel) {
            Ok(outcome) => {
                self.hashes.insert(outcome.number, outcome.hash);
                tracing::info!(
                    number = outcome.number,
                    txs = outcome.receipts.len(),
                    gas_used = outcome.gas_used,
                    root = %outcome.state_root,
                    "block processed"
                );
                Ok(outcome)
            }
            Err(err) => {
                world.reset_to(pre_root);
                tracing::warn!(number = block.header.number, %err, "block failed, state reset");
                Err(err)
            }
        }
    }

    fn run(
        &self,
        world: &mut WorldState,
        block: &Block,
        cancel: &AtomicBool,
    ) -> ExecutionResult<BlockOutcome> {
        let header = &block.header;
        let caps = self.schedule.capabilities_at(header.number);
        let context = BlockContext {
            number: header.number,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            coinbase: header.coinbase,
            difficulty: header.difficulty,
            chain_id: self.chain_id,
            base_fee: header.base_fee,
        };
        tracing::debug!(
            number = header.number,
            fork = ?self.schedule.fork_at(header.number),
            "processing block"
        );

        let mut executor = TransactionExecutor::new(world, context, caps, &self.hashes);
        let mut receipts = Vec::with_capacity(block.transactions.len());
        let mut gas_used = 0u64;

        for tx in &block.transactions {
            if cancel.load(Ordering::Acquire) {
                return Err(ExecutionError::Cancelled);
            }
            let reserved = gas_used.saturating_add(tx.gas_limit);
            if reserved > header.gas_limit {
                return Err(ExecutionError::BlockGasLimitExceeded {
                    used: reserved,
                    limit: header.gas_limit,
                });
            }
            let receipt = executor.execute(tx, gas_used)?;
            gas_used = receipt.cumulative_gas_used;
            receipts.push(receipt);
        }

        let state_root = world.state_root();
        Ok(BlockOutcome {
            number: header.number,
            hash: header.hash(&state_root),
            receipts,
            gas_used,
            state_root,
        })
    }
}
