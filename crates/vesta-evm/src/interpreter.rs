//! Bytecode interpreter for a single call frame

use std::sync::Arc;

use primitive_types::U256;
use vesta_primitives::{keccak256, Address, H256};

use crate::analysis::AnalyzedCode;
use crate::capabilities::Capabilities;
use crate::context::{CallContext, Environment};
use crate::error::{EvmError, EvmResult, Fault};
use crate::gas::{self, cost};
use crate::host::{
    CallKind, CallRequest, CreateKind, CreateRequest, FrameResult, Host, Log, Outcome, Substate,
};
use crate::memory::{self, Memory};
use crate::opcode::Opcode;
use crate::stack::{self, Stack};

/// What the dispatch loop does after an instruction
enum Step {
    /// Fall through to the next instruction
    Continue,
    /// The program counter was set by the instruction
    Jumped,
    /// Normal halt with return data
    Halt(Vec<u8>),
    /// REVERT with reason data
    Revert(Vec<u8>),
}

/// Interpreter state for one frame
#[derive(Debug)]
pub struct Interpreter {
    /// Code being executed
    code: Arc<AnalyzedCode>,
    /// Program counter
    pc: usize,
    /// Operand stack
    stack: Stack,
    /// Memory
    memory: Memory,
    /// Subroutine return addresses
    return_stack: Vec<usize>,
    /// Return data from the last sub-call
    return_data: Vec<u8>,
    /// Gas remaining
    gas: u64,
    /// Effects kept if the frame halts
    substate: Substate,
}

impl Interpreter {
    /// Create an interpreter for `code` with a gas allowance
    pub fn new(code: Arc<AnalyzedCode>, gas: u64) -> Self {
        Self {
            code,
            pc: 0,
            stack: Stack::new(),
            memory: Memory::new(),
            return_stack: Vec::new(),
            return_data: Vec::new(),
            gas,
            substate: Substate::default(),
        }
    }

    /// Run until the frame halts, reverts or faults.
    ///
    /// Faults and reverts are ordinary results. Only failures of the state
    /// layer are returned as errors.
    pub fn run<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        env: &Environment,
        caps: &Capabilities,
    ) -> EvmResult<FrameResult> {
        loop {
            match self.step(host, env, caps) {
                Ok(Step::Continue) => self.pc += 1,
                Ok(Step::Jumped) => {}
                Ok(Step::Halt(output)) => {
                    return Ok(FrameResult {
                        outcome: Outcome::Halted { output },
                        gas_left: self.gas,
                        substate: std::mem::take(&mut self.substate),
                    });
                }
                Ok(Step::Revert(output)) => {
                    return Ok(FrameResult {
                        outcome: Outcome::Reverted { output },
                        gas_left: self.gas,
                        substate: Substate::default(),
                    });
                }
                Err(EvmError::Fault(fault)) => {
                    let op = self.code.bytes().get(self.pc).copied().and_then(Opcode::from_byte);
                    tracing::trace!(
                        depth = env.call.depth,
                        pc = self.pc,
                        op = op.map_or("-", Opcode::name),
                        %fault,
                        "frame faulted"
                    );
                    self.gas = 0;
                    return Ok(FrameResult::faulted(fault));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Get remaining gas
    pub fn gas_remaining(&self) -> u64 {
        self.gas
    }

    /// Get the current stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Execute a single instruction
    fn step<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        env: &Environment,
        caps: &Capabilities,
    ) -> EvmResult<Step> {
        // Falling off the end is an implicit STOP
        let Some(&byte) = self.code.bytes().get(self.pc) else {
            return Ok(Step::Halt(Vec::new()));
        };
        let opcode = Opcode::from_byte(byte)
            .filter(|op| op.is_enabled(caps))
            .ok_or(Fault::InvalidOpcode(byte))?;

        self.use_gas(gas::static_gas(opcode, caps))?;

        let (inputs, outputs) = opcode.stack_io();
        if self.stack.len() < inputs {
            return Err(Fault::StackUnderflow.into());
        }
        if self.stack.len() - inputs + outputs > cost::MAX_STACK_SIZE {
            return Err(Fault::StackOverflow.into());
        }

        if env.call.is_static && opcode.writes_state() {
            return Err(Fault::StaticStateChange.into());
        }

        self.execute(opcode, host, env, caps)
    }

    /// Use gas, returning error if insufficient
    fn use_gas(&mut self, amount: u64) -> Result<(), Fault> {
        if self.gas < amount {
            return Err(Fault::OutOfGas);
        }
        self.gas -= amount;
        Ok(())
    }

    /// Charge for and perform the memory expansion an operand pair implies
    fn memory_range(&mut self, offset: U256, size: U256) -> Result<Option<(usize, usize)>, Fault> {
        let range = memory::resolve_range(&offset, &size)?;
        if let Some((offset, len)) = range {
            let new_size = self.memory.size_after(offset, len);
            self.use_gas(gas::memory_gas(self.memory.size(), new_size))?;
            self.memory.expand(offset, len);
        }
        Ok(range)
    }

    fn pop_address(&mut self) -> Result<Address, Fault> {
        Ok(Address::from_word(self.stack.pop()?))
    }

    fn binary<F: FnOnce(U256, U256) -> U256>(&mut self, f: F) -> Result<Step, Fault> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.stack.push(f(a, b))?;
        Ok(Step::Continue)
    }

    fn push(&mut self, value: U256) -> Result<Step, Fault> {
        self.stack.push(value)?;
        Ok(Step::Continue)
    }

    /// Shared body of CALLDATACOPY, CODECOPY and EXTCODECOPY
    fn copy_to_memory(
        &mut self,
        dest: U256,
        source: &[u8],
        source_offset: U256,
        size: U256,
    ) -> Result<Step, Fault> {
        if let Some((dest, len)) = self.memory_range(dest, size)? {
            self.use_gas(gas::copy_gas(len))?;
            let source_offset = stack::to_usize(&source_offset).unwrap_or(usize::MAX);
            self.memory.copy_from(dest, source, source_offset, len);
        }
        Ok(Step::Continue)
    }

    fn read_memory(&self, range: Option<(usize, usize)>) -> Vec<u8> {
        range.map_or_else(Vec::new, |(offset, len)| {
            self.memory.load_slice(offset, len)
        })
    }

    /// Execute an opcode
    fn execute<H: Host + ?Sized>(
        &mut self,
        opcode: Opcode,
        host: &mut H,
        env: &Environment,
        caps: &Capabilities,
    ) -> EvmResult<Step> {
        let step = match opcode {
            Opcode::STOP => Step::Halt(Vec::new()),

            // Arithmetic
            Opcode::ADD => self.binary(|a, b| a.overflowing_add(b).0)?,
            Opcode::MUL => self.binary(|a, b| a.overflowing_mul(b).0)?,
            Opcode::SUB => self.binary(|a, b| a.overflowing_sub(b).0)?,
            Opcode::DIV => self.binary(|a, b| if b.is_zero() { b } else { a / b })?,
            Opcode::SDIV => self.binary(stack::sdiv)?,
            Opcode::MOD => self.binary(|a, b| if b.is_zero() { b } else { a % b })?,
            Opcode::SMOD => self.binary(stack::smod)?,
            Opcode::ADDMOD => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let n = self.stack.pop()?;
                self.push(stack::addmod(a, b, n))?
            }
            Opcode::MULMOD => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let n = self.stack.pop()?;
                self.push(stack::mulmod(a, b, n))?
            }
            Opcode::EXP => {
                let base = self.stack.pop()?;
                let exponent = self.stack.pop()?;
                self.use_gas(gas::exp_gas(&exponent, caps))?;
                self.push(stack::exp(base, exponent))?
            }
            Opcode::SIGNEXTEND => self.binary(stack::signextend)?,

            // Comparison & Bitwise
            Opcode::LT => self.binary(|a, b| stack::from_bool(a < b))?,
            Opcode::GT => self.binary(|a, b| stack::from_bool(a > b))?,
            Opcode::SLT => self.binary(|a, b| stack::from_bool(stack::slt(&a, &b)))?,
            Opcode::SGT => self.binary(|a, b| stack::from_bool(stack::sgt(&a, &b)))?,
            Opcode::EQ => self.binary(|a, b| stack::from_bool(a == b))?,
            Opcode::ISZERO => {
                let a = self.stack.pop()?;
                self.push(stack::from_bool(a.is_zero()))?
            }
            Opcode::AND => self.binary(|a, b| a & b)?,
            Opcode::OR => self.binary(|a, b| a | b)?,
            Opcode::XOR => self.binary(|a, b| a ^ b)?,
            Opcode::NOT => {
                let a = self.stack.pop()?;
                self.push(!a)?
            }
            Opcode::BYTE => self.binary(stack::byte)?,
            Opcode::SHL => self.binary(stack::shl)?,
            Opcode::SHR => self.binary(stack::shr)?,
            Opcode::SAR => self.binary(stack::sar)?,

            Opcode::KECCAK256 => {
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let range = self.memory_range(offset, size)?;
                self.use_gas(gas::sha3_gas(range.map_or(0, |(_, len)| len)))?;
                let hash = keccak256(&self.read_memory(range));
                self.push(hash.to_word())?
            }

            // Environment
            Opcode::ADDRESS => self.push(env.call.address.to_word())?,
            Opcode::BALANCE => {
                let address = self.pop_address()?;
                let balance = host.balance(&address)?;
                self.push(balance)?
            }
            Opcode::ORIGIN => self.push(env.tx.origin.to_word())?,
            Opcode::CALLER => self.push(env.call.caller.to_word())?,
            Opcode::CALLVALUE => self.push(env.call.value)?,
            Opcode::CALLDATALOAD => {
                let offset = self.stack.pop()?;
                let mut word = Memory::new();
                word.copy_from(
                    0,
                    &env.call.data,
                    stack::to_usize(&offset).unwrap_or(usize::MAX),
                    32,
                );
                self.push(word.load(0))?
            }
            Opcode::CALLDATASIZE => self.push(U256::from(env.call.data.len()))?,
            Opcode::CALLDATACOPY => {
                let dest = self.stack.pop()?;
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                self.copy_to_memory(dest, &env.call.data, offset, size)?
            }
            Opcode::CODESIZE => self.push(U256::from(self.code.len()))?,
            Opcode::CODECOPY => {
                let dest = self.stack.pop()?;
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let code = Arc::clone(&self.code);
                self.copy_to_memory(dest, code.bytes(), offset, size)?
            }
            Opcode::GASPRICE => self.push(env.tx.gas_price)?,
            Opcode::EXTCODESIZE => {
                let address = self.pop_address()?;
                let code = host.code(&address)?;
                self.push(U256::from(code.len()))?
            }
            Opcode::EXTCODECOPY => {
                let address = self.pop_address()?;
                let dest = self.stack.pop()?;
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let code = host.code(&address)?;
                self.copy_to_memory(dest, code.bytes(), offset, size)?
            }
            Opcode::RETURNDATASIZE => self.push(U256::from(self.return_data.len()))?,
            Opcode::RETURNDATACOPY => {
                let dest = self.stack.pop()?;
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let end = offset
                    .checked_add(size)
                    .ok_or(Fault::ReturnDataOutOfBounds)?;
                if end > U256::from(self.return_data.len()) {
                    return Err(Fault::ReturnDataOutOfBounds.into());
                }
                let return_data = std::mem::take(&mut self.return_data);
                let step = self.copy_to_memory(dest, &return_data, offset, size);
                self.return_data = return_data;
                step?
            }
            Opcode::EXTCODEHASH => {
                let address = self.pop_address()?;
                let hash = host.code_hash(&address)?;
                self.push(hash.to_word())?
            }

            // Block
            Opcode::BLOCKHASH => {
                let number = self.stack.pop()?;
                let hash = if number.bits() > 64 {
                    H256::ZERO
                } else {
                    host.block_hash(number.low_u64())
                };
                self.push(hash.to_word())?
            }
            Opcode::COINBASE => self.push(env.block.coinbase.to_word())?,
            Opcode::TIMESTAMP => self.push(U256::from(env.block.timestamp))?,
            Opcode::NUMBER => self.push(U256::from(env.block.number))?,
            Opcode::DIFFICULTY => self.push(env.block.difficulty)?,
            Opcode::GASLIMIT => self.push(U256::from(env.block.gas_limit))?,
            Opcode::CHAINID => self.push(U256::from(env.block.chain_id))?,
            Opcode::SELFBALANCE => {
                let balance = host.balance(&env.call.address)?;
                self.push(balance)?
            }
            Opcode::BASEFEE => self.push(env.block.base_fee)?,

            // Stack, Memory, Storage and Flow
            Opcode::POP => {
                self.stack.pop()?;
                Step::Continue
            }
            Opcode::MLOAD => {
                let offset = self.stack.pop()?;
                let value = match self.memory_range(offset, U256::from(32))? {
                    Some((offset, _)) => self.memory.load(offset),
                    None => U256::zero(),
                };
                self.push(value)?
            }
            Opcode::MSTORE => {
                let offset = self.stack.pop()?;
                let value = self.stack.pop()?;
                if let Some((offset, _)) = self.memory_range(offset, U256::from(32))? {
                    self.memory.store(offset, &value);
                }
                Step::Continue
            }
            Opcode::MSTORE8 => {
                let offset = self.stack.pop()?;
                let value = self.stack.pop()?;
                if let Some((offset, _)) = self.memory_range(offset, U256::one())? {
                    self.memory.store8(offset, value.byte(0));
                }
                Step::Continue
            }
            Opcode::SLOAD => {
                let index = H256::from_word(self.stack.pop()?);
                let value = host.storage(&env.call.address, &index)?;
                self.push(value)?
            }
            Opcode::SSTORE => {
                if caps.eip2200 && self.gas <= cost::SSTORE_SENTRY {
                    return Err(Fault::OutOfGas.into());
                }
                let index = H256::from_word(self.stack.pop()?);
                let value = self.stack.pop()?;
                let address = env.call.address;
                let current = host.storage(&address, &index)?;
                let original = if caps.eip2200 {
                    host.original_storage(&address, &index)?
                } else {
                    current
                };
                let price = gas::sstore_cost(original, current, value, caps);
                self.use_gas(price.gas)?;
                self.substate.refund += price.refund;
                host.set_storage(&address, &index, value)?;
                Step::Continue
            }
            Opcode::JUMP => {
                let dest = self.stack.pop()?;
                self.jump(dest, false)?;
                Step::Jumped
            }
            Opcode::JUMPI => {
                let dest = self.stack.pop()?;
                let condition = self.stack.pop()?;
                if condition.is_zero() {
                    Step::Continue
                } else {
                    self.jump(dest, false)?;
                    Step::Jumped
                }
            }
            Opcode::PC => self.push(U256::from(self.pc))?,
            Opcode::MSIZE => self.push(U256::from(self.memory.size()))?,
            Opcode::GAS => self.push(U256::from(self.gas))?,
            Opcode::JUMPDEST => Step::Continue,

            // Subroutines
            Opcode::BEGINSUB => return Err(Fault::InvalidSubroutineEntry.into()),
            Opcode::JUMPSUB => {
                let dest = self.stack.pop()?;
                if self.return_stack.len() >= cost::MAX_RETURN_STACK_SIZE {
                    return Err(Fault::ReturnStackOverflow.into());
                }
                let return_pc = self.pc + 1;
                self.jump(dest, true)?;
                self.return_stack.push(return_pc);
                // Execution resumes after the BEGINSUB marker
                self.pc += 1;
                Step::Jumped
            }
            Opcode::RETURNSUB => {
                self.pc = self.return_stack.pop().ok_or(Fault::ReturnStackUnderflow)?;
                Step::Jumped
            }

            Opcode::PUSH0 => self.push(U256::zero())?,
            op if op.push_size() > 0 => {
                let size = op.push_size();
                let mut word = [0u8; 32];
                let code = self.code.bytes();
                let start = (self.pc + 1).min(code.len());
                let end = (self.pc + 1 + size).min(code.len());
                // Missing trailing bytes read as zero
                word[32 - size..32 - size + (end - start)].copy_from_slice(&code[start..end]);
                self.pc += size;
                self.push(U256::from_big_endian(&word))?
            }
            op if op.dup_depth() > 0 => {
                self.stack.dup(op.dup_depth())?;
                Step::Continue
            }
            op if op.swap_depth() > 0 => {
                self.stack.swap(op.swap_depth())?;
                Step::Continue
            }

            op if op.is_log() => {
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let mut topics = Vec::with_capacity(op.log_topics());
                for _ in 0..op.log_topics() {
                    topics.push(H256::from_word(self.stack.pop()?));
                }
                let range = self.memory_range(offset, size)?;
                self.use_gas(gas::log_data_gas(range.map_or(0, |(_, len)| len)))?;
                let data = self.read_memory(range);
                self.substate.logs.push(Log {
                    address: env.call.address,
                    topics,
                    data,
                });
                Step::Continue
            }

            // System
            Opcode::CREATE | Opcode::CREATE2 => self.create(opcode, host, env, caps)?,
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL => {
                self.call(opcode, host, env, caps)?
            }
            Opcode::RETURN => {
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let range = self.memory_range(offset, size)?;
                Step::Halt(self.read_memory(range))
            }
            Opcode::REVERT => {
                let offset = self.stack.pop()?;
                let size = self.stack.pop()?;
                let range = self.memory_range(offset, size)?;
                Step::Revert(self.read_memory(range))
            }
            Opcode::SELFDESTRUCT => {
                let beneficiary = self.pop_address()?;
                let address = env.call.address;
                if caps.eip150 {
                    let creates_account = if caps.eip158 {
                        host.is_dead(&beneficiary)? && !host.balance(&address)?.is_zero()
                    } else {
                        !host.account_exists(&beneficiary)?
                    };
                    if creates_account {
                        self.use_gas(cost::SELFDESTRUCT_NEW_ACCOUNT)?;
                    }
                }
                host.selfdestruct(&address, &beneficiary)?;
                self.substate.selfdestructs.insert(address);
                Step::Halt(Vec::new())
            }

            // INVALID and anything left undefined
            _ => return Err(Fault::InvalidOpcode(opcode as u8).into()),
        };
        Ok(step)
    }

    /// Validate a jump target and move the program counter there
    fn jump(&mut self, dest: U256, wants_subroutine: bool) -> Result<(), Fault> {
        let dest = stack::to_usize(&dest).ok_or(Fault::BadJumpDestination(usize::MAX))?;
        if !self.code.is_valid_target(dest, wants_subroutine) {
            return Err(Fault::BadJumpDestination(dest));
        }
        self.pc = dest;
        Ok(())
    }

    /// Gas handed to a child frame out of what is left
    fn child_gas(&self, requested: u64, caps: &Capabilities) -> u64 {
        if caps.eip150 {
            requested.min(gas::all_but_one_64th(self.gas))
        } else {
            requested
        }
    }

    fn create<H: Host + ?Sized>(
        &mut self,
        opcode: Opcode,
        host: &mut H,
        env: &Environment,
        caps: &Capabilities,
    ) -> EvmResult<Step> {
        let value = self.stack.pop()?;
        let offset = self.stack.pop()?;
        let size = self.stack.pop()?;
        let range = self.memory_range(offset, size)?;

        let kind = if opcode == Opcode::CREATE2 {
            let salt = H256::from_word(self.stack.pop()?);
            self.use_gas(gas::sha3_gas(range.map_or(0, |(_, len)| len)))?;
            CreateKind::Create2 { salt }
        } else {
            CreateKind::Create
        };
        let init_code = self.read_memory(range);

        self.return_data.clear();
        if env.call.depth >= cost::MAX_CALL_DEPTH
            || host.balance(&env.call.address)? < value
        {
            self.stack.push(U256::zero())?;
            return Ok(Step::Continue);
        }

        let gas = self.child_gas(self.gas, caps);
        self.use_gas(gas)?;

        let result = host.create(CreateRequest {
            kind,
            caller: env.call.address,
            value,
            init_code,
            gas,
            depth: env.call.depth + 1,
        })?;

        self.gas += result.frame.gas_left;
        let pushed = match (result.frame.outcome, result.address) {
            (Outcome::Halted { .. }, Some(address)) => {
                self.substate.merge(result.frame.substate);
                address.to_word()
            }
            (Outcome::Reverted { output }, _) => {
                self.return_data = output;
                U256::zero()
            }
            _ => U256::zero(),
        };
        self.stack.push(pushed)?;
        Ok(Step::Continue)
    }

    fn call<H: Host + ?Sized>(
        &mut self,
        opcode: Opcode,
        host: &mut H,
        env: &Environment,
        caps: &Capabilities,
    ) -> EvmResult<Step> {
        let kind = match opcode {
            Opcode::CALL => CallKind::Call,
            Opcode::CALLCODE => CallKind::CallCode,
            Opcode::DELEGATECALL => CallKind::DelegateCall,
            _ => CallKind::StaticCall,
        };

        let requested = stack::saturating_u64(&self.stack.pop()?);
        let target = self.pop_address()?;
        let value = match kind {
            CallKind::Call | CallKind::CallCode => self.stack.pop()?,
            CallKind::DelegateCall => env.call.value,
            CallKind::StaticCall => U256::zero(),
        };
        let in_offset = self.stack.pop()?;
        let in_size = self.stack.pop()?;
        let out_offset = self.stack.pop()?;
        let out_size = self.stack.pop()?;

        let transfers_value = matches!(kind, CallKind::Call | CallKind::CallCode) && !value.is_zero();
        if env.call.is_static && kind == CallKind::Call && transfers_value {
            return Err(Fault::StaticStateChange.into());
        }

        let input_range = self.memory_range(in_offset, in_size)?;
        let output_range = self.memory_range(out_offset, out_size)?;

        let mut extra = 0;
        if transfers_value {
            extra += cost::CALL_VALUE;
        }
        if kind == CallKind::Call {
            let creates_account = if caps.eip158 {
                transfers_value && host.is_dead(&target)?
            } else {
                !host.account_exists(&target)?
            };
            if creates_account {
                extra += cost::CALL_NEW_ACCOUNT;
            }
        }
        self.use_gas(extra)?;

        let gas = self.child_gas(requested, caps);
        self.use_gas(gas)?;
        let gas = if transfers_value {
            gas + cost::CALL_STIPEND
        } else {
            gas
        };

        self.return_data.clear();
        if env.call.depth >= cost::MAX_CALL_DEPTH
            || (transfers_value && host.balance(&env.call.address)? < value)
        {
            self.gas += gas;
            self.stack.push(U256::zero())?;
            return Ok(Step::Continue);
        }

        let context = CallContext {
            address: match kind {
                CallKind::Call | CallKind::StaticCall => target,
                CallKind::CallCode | CallKind::DelegateCall => env.call.address,
            },
            caller: match kind {
                CallKind::DelegateCall => env.call.caller,
                _ => env.call.address,
            },
            value,
            data: self.read_memory(input_range),
            gas,
            is_static: env.call.is_static || kind == CallKind::StaticCall,
            depth: env.call.depth + 1,
        };

        let result = host.call(CallRequest {
            kind,
            context,
            code_address: target,
        })?;

        self.gas += result.gas_left;
        let success = result.is_success();
        let output = match result.outcome {
            Outcome::Halted { output } | Outcome::Reverted { output } => output,
            Outcome::Faulted(_) => Vec::new(),
        };
        if let Some((offset, len)) = output_range {
            let copied = len.min(output.len());
            self.memory.store_slice(offset, &output[..copied]);
        }
        self.return_data = output;
        if success {
            self.substate.merge(result.substate);
        }
        self.stack.push(stack::from_bool(success))?;
        Ok(Step::Continue)
    }
}
