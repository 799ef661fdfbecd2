//! Transaction executor
//!
//! [`TransactionExecutor`] validates a transaction, charges its upfront cost,
//! runs the outermost frame and settles gas, refunds and fees. It is also the
//! [`Host`] of every frame: nested calls and creations come back here, take
//! a snapshot of the world and run a fresh [`Interpreter`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vesta_evm::gas::{self, cost};
use vesta_evm::{
    AnalyzedCode, BlockContext, CallContext, CallKind, CallRequest, Capabilities, CreateKind,
    CreateRequest, CreateResult, Environment, EvmResult, Fault, FrameResult, Host, Interpreter,
    Log, Outcome, Substate, TxContext,
};
use vesta_primitives::{
    create2_address, create_address, keccak256, serde_hex, Address, H256, U256, EMPTY_CODE_HASH,
};

use crate::block::BlockHashes;
use crate::error::{ExecutionError, ExecutionResult};
use crate::world::WorldState;

/// A transaction whose sender is already known
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender
    pub sender: Address,
    /// Recipient; `None` creates a contract
    #[serde(default)]
    pub to: Option<Address>,
    /// Sender nonce
    #[serde(default)]
    pub nonce: u64,
    /// Value transferred
    #[serde(default)]
    pub value: U256,
    /// Call data or init code
    #[serde(default, with = "serde_hex")]
    pub data: Vec<u8>,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas price
    #[serde(default)]
    pub gas_price: U256,
}

impl Transaction {
    /// Whether this transaction creates a contract
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }
}

/// Outcome of an executed transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Whether the outermost frame halted normally
    pub success: bool,
    /// Gas charged after refunds
    pub gas_used: u64,
    /// Gas used by the block up to and including this transaction
    pub cumulative_gas_used: u64,
    /// Logs of the successful frames
    pub logs: Vec<Log>,
    /// Return data, revert reason, or deployed code
    #[serde(with = "serde_hex")]
    pub output: Vec<u8>,
    /// Address of the created contract
    pub contract_address: Option<Address>,
    /// Post-transaction state root, before status receipts (EIP-658)
    pub state_root: Option<H256>,
}

/// Runs transactions against a [`WorldState`]
pub struct TransactionExecutor<'a> {
    world: &'a mut WorldState,
    env: Environment,
    caps: Capabilities,
    block_hashes: &'a BlockHashes,
}

impl<'a> TransactionExecutor<'a> {
    /// Create an executor for one block
    pub fn new(
        world: &'a mut WorldState,
        block: BlockContext,
        caps: Capabilities,
        block_hashes: &'a BlockHashes,
    ) -> Self {
        Self {
            world,
            env: Environment {
                block,
                ..Default::default()
            },
            caps,
            block_hashes,
        }
    }

    /// Check a transaction against the current state without writing
    pub fn validate(&mut self, tx: &Transaction) -> ExecutionResult<u64> {
        let state = self.world.state();
        let nonce = state.get_nonce(&tx.sender)?;
        if tx.nonce != nonce {
            return Err(ExecutionError::NonceMismatch {
                expected: nonce,
                got: tx.nonce,
            });
        }

        let intrinsic = gas::intrinsic_gas(&tx.data, tx.is_create(), &self.caps);
        if tx.gas_limit < intrinsic {
            return Err(ExecutionError::IntrinsicGasTooLow {
                required: intrinsic,
                provided: tx.gas_limit,
            });
        }

        let available = state.get_balance(&tx.sender)?;
        let required = upfront_cost(tx)
            .and_then(|gas_cost| gas_cost.checked_add(tx.value))
            .unwrap_or(U256::MAX);
        if available < required {
            return Err(ExecutionError::InsufficientBalance {
                sender: tx.sender,
                required,
                available,
            });
        }
        Ok(intrinsic)
    }

    /// Execute and commit a transaction
    pub fn execute(&mut self, tx: &Transaction, cumulative_gas: u64) -> ExecutionResult<Receipt> {
        let intrinsic = match self.validate(tx) {
            Ok(intrinsic) => intrinsic,
            Err(err) => {
                tracing::debug!(sender = %tx.sender, nonce = tx.nonce, %err, "transaction rejected");
                return Err(err);
            }
        };

        let gas_cost = upfront_cost(tx).unwrap_or(U256::MAX);
        self.world.state().subtract_from_balance(&tx.sender, gas_cost)?;
        self.world.state().increment_nonce(&tx.sender)?;

        self.env.tx = TxContext {
            origin: tx.sender,
            gas_price: tx.gas_price,
        };
        let gas = tx.gas_limit - intrinsic;

        let (frame, contract_address) = match tx.to {
            Some(to) => {
                let request = CallRequest {
                    kind: CallKind::Call,
                    context: CallContext::new(to, tx.sender, tx.value, tx.data.clone(), gas),
                    code_address: to,
                };
                (self.call(request)?, None)
            }
            None => {
                let address = create_address(&tx.sender, tx.nonce);
                let request = CreateRequest {
                    kind: CreateKind::Create,
                    caller: tx.sender,
                    value: tx.value,
                    init_code: tx.data.clone(),
                    gas,
                    depth: 0,
                };
                let result = self.create_at(request, address)?;
                (result.frame, result.address)
            }
        };

        let success = frame.is_success();
        let substate = if success {
            frame.substate
        } else {
            Substate::default()
        };

        let mut gas_left = frame.gas_left;
        let gas_refund = self.refund(&substate, tx.gas_limit - gas_left);
        gas_left += gas_refund;
        let gas_used = tx.gas_limit - gas_left;

        self.world
            .state()
            .add_to_balance(&tx.sender, tx.gas_price.saturating_mul(U256::from(gas_left)))?;
        let coinbase = self.env.block.coinbase;
        self.world
            .state()
            .add_to_balance(&coinbase, tx.gas_price.saturating_mul(U256::from(gas_used)))?;
        self.world.state().touch(&coinbase)?;

        for address in &substate.selfdestructs {
            self.world.state().delete_account(address);
        }
        let root = self.world.commit(self.caps.eip158)?;

        tracing::trace!(
            sender = %tx.sender,
            success,
            gas_used,
            refund = gas_refund,
            "transaction executed"
        );

        Ok(Receipt {
            success,
            gas_used,
            cumulative_gas_used: cumulative_gas + gas_used,
            logs: substate.logs,
            output: frame.outcome.output().to_vec(),
            contract_address: contract_address.filter(|_| success),
            state_root: (!self.caps.eip658).then_some(root),
        })
    }

    /// Refund owed for a finished transaction, capped by the gas it used
    fn refund(&self, substate: &Substate, gas_used: u64) -> u64 {
        let selfdestructs = if self.caps.eip3529 {
            0
        } else {
            cost::SELFDESTRUCT_REFUND * substate.selfdestructs.len() as u64
        };
        let total = (substate.refund.max(0) as u64).saturating_add(selfdestructs);
        total.min(gas_used / self.caps.max_refund_quotient())
    }

    /// Run the init frame of a creation at a known address
    fn create_at(&mut self, request: CreateRequest, address: Address) -> EvmResult<CreateResult> {
        let caps = self.caps;
        let state = self.world.state();
        if state.get_nonce(&address)? != 0 || state.get_code_hash(&address)? != EMPTY_CODE_HASH {
            return Ok(CreateResult {
                address: None,
                frame: FrameResult::faulted(Fault::AddressCollision),
            });
        }

        let snapshot = self.world.snapshot();
        let state = self.world.state();
        let endowment = state.get_balance(&address)?;
        state.delete_account(&address);
        state.create_account(&address, endowment)?;
        if caps.eip158 {
            state.set_nonce(&address, 1)?;
        }
        state.subtract_from_balance(&request.caller, request.value)?;
        state.add_to_balance(&address, request.value)?;

        let env = self.env.with_call(CallContext {
            address,
            caller: request.caller,
            value: request.value,
            data: Vec::new(),
            gas: request.gas,
            is_static: false,
            depth: request.depth,
        });
        let code = Arc::new(AnalyzedCode::new(request.init_code));
        let mut frame = Interpreter::new(code, request.gas).run(self, &env, &caps)?;

        if let Outcome::Halted { output } = &frame.outcome {
            match self.deposit(&address, output, frame.gas_left)? {
                Ok(gas_left) => frame.gas_left = gas_left,
                Err(fault) => frame = FrameResult::faulted(fault),
            }
        }

        if frame.is_success() {
            self.world.release(snapshot);
            tracing::trace!(%address, depth = request.depth, "contract created");
            Ok(CreateResult {
                address: Some(address),
                frame,
            })
        } else {
            self.world.revert(snapshot)?;
            Ok(CreateResult {
                address: None,
                frame,
            })
        }
    }

    /// Store deployed code, returning the gas left after the deposit charge
    fn deposit(
        &mut self,
        address: &Address,
        code: &[u8],
        gas_left: u64,
    ) -> EvmResult<Result<u64, Fault>> {
        if self.caps.eip3541 && code.first() == Some(&0xEF) {
            return Ok(Err(Fault::InvalidCodePrefix));
        }
        if self.caps.eip170 && code.len() > cost::MAX_CODE_SIZE {
            return Ok(Err(Fault::CodeSizeLimit(code.len())));
        }

        let deposit = cost::CODE_DEPOSIT.saturating_mul(code.len() as u64);
        if gas_left < deposit {
            // Frontier keeps the account with empty code
            return Ok(if self.caps.eip2 {
                Err(Fault::OutOfGas)
            } else {
                Ok(gas_left)
            });
        }
        self.world.set_code(address, code.to_vec())?;
        Ok(Ok(gas_left - deposit))
    }
}

/// Gas limit times gas price, if it fits
fn upfront_cost(tx: &Transaction) -> Option<U256> {
    tx.gas_price.checked_mul(U256::from(tx.gas_limit))
}

impl Host for TransactionExecutor<'_> {
    fn balance(&mut self, address: &Address) -> EvmResult<U256> {
        Ok(self.world.state().get_balance(address)?)
    }

    fn code(&mut self, address: &Address) -> EvmResult<Arc<AnalyzedCode>> {
        Ok(self.world.code(address)?)
    }

    fn code_hash(&mut self, address: &Address) -> EvmResult<H256> {
        let state = self.world.state();
        let absent = if self.caps.eip158 {
            state.is_dead_account(address)?
        } else {
            !state.account_exists(address)?
        };
        if absent {
            return Ok(H256::ZERO);
        }
        Ok(state.get_code_hash(address)?)
    }

    fn account_exists(&mut self, address: &Address) -> EvmResult<bool> {
        Ok(self.world.state().account_exists(address)?)
    }

    fn is_dead(&mut self, address: &Address) -> EvmResult<bool> {
        Ok(self.world.state().is_dead_account(address)?)
    }

    fn storage(&mut self, address: &Address, index: &H256) -> EvmResult<U256> {
        Ok(self.world.storage(address, index)?)
    }

    fn original_storage(&mut self, address: &Address, index: &H256) -> EvmResult<U256> {
        Ok(self.world.committed_storage(address, index)?)
    }

    fn set_storage(&mut self, address: &Address, index: &H256, value: U256) -> EvmResult<()> {
        self.world.set_storage(address, index, value);
        Ok(())
    }

    fn block_hash(&mut self, number: u64) -> H256 {
        vesta_evm::context::visible_block_hash(self.env.block.number, number, |n| {
            self.block_hashes.get(n)
        })
    }

    fn selfdestruct(&mut self, address: &Address, beneficiary: &Address) -> EvmResult<()> {
        let state = self.world.state();
        let balance = state.get_balance(address)?;
        // Sending to itself burns the balance
        if beneficiary != address {
            state.add_to_balance(beneficiary, balance)?;
        }
        state.touch(beneficiary)?;
        state.subtract_from_balance_saturating(address, balance)?;
        Ok(())
    }

    fn call(&mut self, request: CallRequest) -> EvmResult<FrameResult> {
        let caps = self.caps;
        let snapshot = self.world.snapshot();
        let context = &request.context;

        if request.transfers_value() && !context.value.is_zero() {
            let state = self.world.state();
            state.subtract_from_balance(&context.caller, context.value)?;
            state.add_to_balance(&context.address, context.value)?;
        } else if request.kind == CallKind::Call {
            self.world.state().touch(&context.address)?;
        }

        let code = self.world.code(&request.code_address)?;
        if code.is_empty() {
            self.world.release(snapshot);
            return Ok(FrameResult::halted(Vec::new(), context.gas));
        }

        tracing::trace!(
            target = %request.code_address,
            depth = context.depth,
            gas = context.gas,
            "entering frame"
        );
        let env = self.env.with_call(request.context);
        let frame = Interpreter::new(code, env.call.gas).run(self, &env, &caps)?;

        if frame.is_success() {
            self.world.release(snapshot);
        } else {
            self.world.revert(snapshot)?;
        }
        Ok(frame)
    }

    fn create(&mut self, request: CreateRequest) -> EvmResult<CreateResult> {
        let nonce = self.world.state().increment_nonce(&request.caller)?;
        let address = match request.kind {
            CreateKind::Create => create_address(&request.caller, nonce),
            CreateKind::Create2 { salt } => {
                create2_address(&request.caller, &salt, &keccak256(&request.init_code))
            }
        };
        self.create_at(request, address)
    }
}
