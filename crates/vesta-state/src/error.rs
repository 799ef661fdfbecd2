//! State error types

use thiserror::Error;
use vesta_primitives::{Address, H256, U256};

/// State layer errors
#[derive(Debug, Error)]
pub enum StateError {
    /// Balance would go negative
    #[error("insufficient balance for {address}: required {required}, available {available}")]
    InsufficientBalance {
        /// Account being debited
        address: Address,
        /// Amount requested
        required: U256,
        /// Current balance
        available: U256,
    },

    /// Credit would exceed the largest representable balance
    #[error("balance overflow for {address}: balance {balance}, credit {value}")]
    BalanceOverflow {
        /// Account being credited
        address: Address,
        /// Current balance
        balance: U256,
        /// Amount credited
        value: U256,
    },

    /// Account already exists and is not empty
    #[error("account already exists: {0}")]
    AccountAlreadyExists(Address),

    /// Restore target was never issued by this journal
    #[error("unknown checkpoint {checkpoint} (journal length {len})")]
    UnknownCheckpoint {
        /// Requested position
        checkpoint: usize,
        /// Current journal length
        len: usize,
    },

    /// Restore target lies in the committed part of the journal
    #[error("checkpoint {checkpoint} already committed (boundary {base})")]
    CheckpointCommitted {
        /// Requested position
        checkpoint: usize,
        /// First uncommitted position
        base: usize,
    },

    /// Commit requested while call frames still hold checkpoints
    #[error("cannot commit with {0} open frame(s)")]
    OpenFrames(usize),

    /// Database not open (closed or never opened)
    #[error("database not open")]
    NotOpen,

    /// Database already open
    #[error("database already open")]
    AlreadyOpen,

    /// Invalid column family
    #[error("invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// Root does not name a known tree node
    #[error("missing trie node: {0}")]
    MissingTrieNode(H256),

    /// Code hash has no stored code
    #[error("missing code: {0}")]
    MissingCode(H256),

    /// Malformed stored data
    #[error("decode error: {0}")]
    Decode(String),

    /// RocksDB error
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rlp::DecoderError> for StateError {
    fn from(err: rlp::DecoderError) -> Self {
        StateError::Decode(err.to_string())
    }
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;
