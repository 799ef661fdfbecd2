//! Interface between a frame and the world it runs in
//!
//! The interpreter reads and writes accounts only through [`Host`]. Nested
//! frames are also requested through it; the host takes a checkpoint, runs a
//! fresh interpreter and restores the checkpoint if the child does not halt.

use std::collections::BTreeSet;
use std::sync::Arc;

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use vesta_primitives::{Address, H256};

use crate::analysis::AnalyzedCode;
use crate::context::CallContext;
use crate::error::{EvmResult, Fault};

/// Log entry emitted by LOG0..LOG4
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics
    pub topics: Vec<H256>,
    /// Payload
    #[serde(with = "vesta_primitives::serde_hex")]
    pub data: Vec<u8>,
}

/// Side effects accumulated by a frame and kept only if it halts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Substate {
    /// Logs in emission order
    pub logs: Vec<Log>,
    /// SSTORE refund counter
    pub refund: i64,
    /// Accounts scheduled for deletion at the end of the transaction
    pub selfdestructs: BTreeSet<Address>,
}

impl Substate {
    /// Fold a successful child frame's effects into this one
    pub fn merge(&mut self, child: Substate) {
        self.logs.extend(child.logs);
        self.refund += child.refund;
        self.selfdestructs.extend(child.selfdestructs);
    }
}

/// How a frame ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// STOP, RETURN, SELFDESTRUCT or end of code
    Halted {
        /// Return data
        output: Vec<u8>,
    },
    /// REVERT
    Reverted {
        /// Revert reason
        output: Vec<u8>,
    },
    /// Exceptional halt
    Faulted(Fault),
}

impl Outcome {
    /// Whether the frame halted normally
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Halted { .. })
    }

    /// Return data visible to the caller
    pub fn output(&self) -> &[u8] {
        match self {
            Outcome::Halted { output } | Outcome::Reverted { output } => output,
            Outcome::Faulted(_) => &[],
        }
    }
}

/// Result of running one frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameResult {
    /// How the frame ended
    pub outcome: Outcome,
    /// Gas returned to the caller (zero after a fault)
    pub gas_left: u64,
    /// Effects to merge into the caller (empty unless halted)
    pub substate: Substate,
}

impl FrameResult {
    /// A frame that halted without running code
    pub fn halted(output: Vec<u8>, gas_left: u64) -> Self {
        Self {
            outcome: Outcome::Halted { output },
            gas_left,
            substate: Substate::default(),
        }
    }

    /// A frame that faulted, consuming all its gas
    pub fn faulted(fault: Fault) -> Self {
        Self {
            outcome: Outcome::Faulted(fault),
            gas_left: 0,
            substate: Substate::default(),
        }
    }

    /// Whether the frame halted normally
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Message-call flavours
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// CALL
    Call,
    /// CALLCODE: callee code in the caller's context
    CallCode,
    /// DELEGATECALL: callee code with the caller's context and value
    DelegateCall,
    /// STATICCALL
    StaticCall,
}

/// A nested message call
#[derive(Clone, Debug)]
pub struct CallRequest {
    /// Call flavour
    pub kind: CallKind,
    /// Context of the child frame
    pub context: CallContext,
    /// Account whose code runs
    pub code_address: Address,
}

impl CallRequest {
    /// Whether `context.value` moves from `context.caller` to `context.address`
    pub fn transfers_value(&self) -> bool {
        matches!(self.kind, CallKind::Call | CallKind::CallCode)
    }
}

/// Contract creation flavours
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateKind {
    /// CREATE: address from sender and nonce
    Create,
    /// CREATE2: address from sender, salt and init code hash
    Create2 {
        /// Salt operand
        salt: H256,
    },
}

/// A contract creation
#[derive(Clone, Debug)]
pub struct CreateRequest {
    /// Creation flavour
    pub kind: CreateKind,
    /// Creating account
    pub caller: Address,
    /// Endowment
    pub value: U256,
    /// Init code
    pub init_code: Vec<u8>,
    /// Gas handed to the init frame
    pub gas: u64,
    /// Depth of the init frame
    pub depth: usize,
}

/// Result of a contract creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateResult {
    /// Address of the new contract when the creation succeeded
    pub address: Option<Address>,
    /// Init frame result
    pub frame: FrameResult,
}

/// World access for the interpreter
pub trait Host {
    /// Balance of an account
    fn balance(&mut self, address: &Address) -> EvmResult<U256>;

    /// Code of an account (empty when it has none)
    fn code(&mut self, address: &Address) -> EvmResult<Arc<AnalyzedCode>>;

    /// Code hash for EXTCODEHASH: zero for accounts that do not exist or are
    /// empty under the active rules
    fn code_hash(&mut self, address: &Address) -> EvmResult<H256>;

    /// Whether the account exists at all
    fn account_exists(&mut self, address: &Address) -> EvmResult<bool>;

    /// Whether the account is absent or empty
    fn is_dead(&mut self, address: &Address) -> EvmResult<bool>;

    /// Current value of a storage slot
    fn storage(&mut self, address: &Address, index: &H256) -> EvmResult<U256>;

    /// Value of a storage slot at the start of the transaction
    fn original_storage(&mut self, address: &Address, index: &H256) -> EvmResult<U256>;

    /// Write a storage slot
    fn set_storage(&mut self, address: &Address, index: &H256, value: U256) -> EvmResult<()>;

    /// Hash of an ancestor block, zero outside the visible window
    fn block_hash(&mut self, number: u64) -> H256;

    /// Move the whole balance of `address` to `beneficiary`
    fn selfdestruct(&mut self, address: &Address, beneficiary: &Address) -> EvmResult<()>;

    /// Run a nested message call
    fn call(&mut self, request: CallRequest) -> EvmResult<FrameResult>;

    /// Run a contract creation
    fn create(&mut self, request: CreateRequest) -> EvmResult<CreateResult>;
}
