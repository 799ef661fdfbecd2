//! What a frame can observe about its call, transaction and block

use primitive_types::U256;
use vesta_primitives::{Address, H256};

/// Number of ancestors BLOCKHASH can reach
pub const BLOCKHASH_DEPTH: u64 = 256;

/// Per-frame call parameters
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    /// Account whose storage and balance the frame acts on
    pub address: Address,
    /// Immediate caller
    pub caller: Address,
    /// Value sent, or the parent's value for DELEGATECALL
    pub value: U256,
    /// Input data
    pub data: Vec<u8>,
    /// Gas available to the frame
    pub gas: u64,
    /// State writes are forbidden
    pub is_static: bool,
    /// Nesting depth, 0 for the transaction's own frame
    pub depth: usize,
}

impl CallContext {
    /// Outermost frame of a transaction
    pub fn new(address: Address, caller: Address, value: U256, data: Vec<u8>, gas: u64) -> Self {
        Self {
            address,
            caller,
            value,
            data,
            gas,
            ..Default::default()
        }
    }
}

/// Block-level values, fixed for every transaction of a block
#[derive(Clone, Debug)]
pub struct BlockContext {
    /// Height
    pub number: u64,
    /// Timestamp
    pub timestamp: u64,
    /// Gas limit
    pub gas_limit: u64,
    /// Fee recipient
    pub coinbase: Address,
    /// Difficulty
    pub difficulty: U256,
    /// CHAINID value
    pub chain_id: u64,
    /// BASEFEE value
    pub base_fee: U256,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            gas_limit: 30_000_000,
            coinbase: Address::ZERO,
            difficulty: U256::zero(),
            chain_id: 1,
            base_fee: U256::zero(),
        }
    }
}

/// Transaction-level values shared by all frames of one transaction
#[derive(Clone, Debug, Default)]
pub struct TxContext {
    /// Sender of the transaction
    pub origin: Address,
    /// Gas price
    pub gas_price: U256,
}

/// Everything a frame reads besides the world state
#[derive(Clone, Debug, Default)]
pub struct Environment {
    /// This frame's call
    pub call: CallContext,
    /// Enclosing block
    pub block: BlockContext,
    /// Enclosing transaction
    pub tx: TxContext,
}

impl Environment {
    /// Same block and transaction, different frame
    pub fn with_call(&self, call: CallContext) -> Self {
        Self {
            call,
            block: self.block.clone(),
            tx: self.tx.clone(),
        }
    }
}

/// Hash of block `number` as seen from block `current`; zero unless it is
/// one of the [`BLOCKHASH_DEPTH`] most recent ancestors known to `lookup`
pub fn visible_block_hash<F>(current: u64, number: u64, lookup: F) -> H256
where
    F: FnOnce(u64) -> Option<H256>,
{
    if number >= current || current - number > BLOCKHASH_DEPTH {
        return H256::ZERO;
    }
    lookup(number).unwrap_or(H256::ZERO)
}
