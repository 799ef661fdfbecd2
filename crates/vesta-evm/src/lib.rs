//! # vesta-evm
//!
//! Bytecode interpreter for the Vesta execution engine.
//!
//! This crate provides:
//! - [`Interpreter`] for a single call frame
//! - lazy jump analysis ([`AnalyzedCode`]) and a shared [`CodeCache`]
//! - fee schedule and per-block [`Capabilities`]
//! - the [`Host`] trait through which frames reach the world state

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod capabilities;
pub mod context;
mod error;
pub mod gas;
pub mod host;
mod interpreter;
pub mod memory;
pub mod opcode;
pub mod stack;

pub use analysis::{AnalyzedCode, CodeCache, JumpTable, DEFAULT_CODE_CACHE_CAPACITY};
pub use capabilities::{Capabilities, Fork, ForkActivation, ForkSchedule};
pub use context::{BlockContext, CallContext, Environment, TxContext};
pub use error::{EvmError, EvmResult, Fault};
pub use host::{
    CallKind, CallRequest, CreateKind, CreateRequest, CreateResult, FrameResult, Host, Log,
    Outcome, Substate,
};
pub use interpreter::Interpreter;
pub use opcode::Opcode;
