//! Execution error types

use thiserror::Error;
use vesta_evm::EvmError;
use vesta_primitives::{Address, H256, U256};
use vesta_state::StateError;

/// Transaction and block execution errors.
///
/// The first group rejects a transaction before it touches the journal.
/// `State` and `Evm` are hard failures; the block they occur in is rolled
/// back as a whole.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Nonce mismatch
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch {
        /// Expected nonce
        expected: u64,
        /// Actual nonce
        got: u64,
    },

    /// Sender cannot cover value plus upfront gas
    #[error("insufficient balance for {sender}: required {required}, available {available}")]
    InsufficientBalance {
        /// Transaction sender
        sender: Address,
        /// Value plus gas limit times gas price
        required: U256,
        /// Sender balance
        available: U256,
    },

    /// Gas limit below the intrinsic cost
    #[error("intrinsic gas too low: required {required}, provided {provided}")]
    IntrinsicGasTooLow {
        /// Intrinsic cost
        required: u64,
        /// Transaction gas limit
        provided: u64,
    },

    /// Block gas limit exceeded
    #[error("block gas limit exceeded: {used} > {limit}")]
    BlockGasLimitExceeded {
        /// Gas used including the offending transaction's limit
        used: u64,
        /// Block gas limit
        limit: u64,
    },

    /// Block processing was cancelled between transactions
    #[error("block processing cancelled")]
    Cancelled,

    /// State layer failure
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Interpreter failure outside a frame fault
    #[error("EVM error: {0}")]
    Evm(#[from] EvmError),

    /// Store was initialized from a different genesis
    #[error("genesis mismatch: store has {stored}, allocation gives {provided}")]
    GenesisMismatch {
        /// Genesis root recorded in the store
        stored: H256,
        /// Root of the allocation being applied
        provided: H256,
    },

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),
}

impl ExecutionError {
    /// Whether the transaction was rejected before execution
    pub fn is_invalid_transaction(&self) -> bool {
        matches!(
            self,
            ExecutionError::NonceMismatch { .. }
                | ExecutionError::InsufficientBalance { .. }
                | ExecutionError::IntrinsicGasTooLow { .. }
                | ExecutionError::BlockGasLimitExceeded { .. }
        )
    }
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;
