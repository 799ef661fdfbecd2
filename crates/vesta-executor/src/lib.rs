//! # vesta-executor
//!
//! Transaction and block execution for the Vesta execution engine.
//!
//! This crate provides:
//! - [`WorldState`]: accounts, storage and code behind frame snapshots
//! - [`TransactionExecutor`]: validation, gas settlement and the [`vesta_evm::Host`]
//!   that runs nested frames
//! - [`BlockProcessor`]: ordered block execution with cooperative cancellation
//! - [`StateQuery`]: read-only views at historical roots
//! - [`Engine`]: the facade tying storage, configuration and genesis together

#![warn(missing_docs)]
#![warn(clippy::all)]

mod block;
mod config;
mod engine;
mod error;
mod executor;
mod genesis;
mod query;
mod world;

pub use block::{Block, BlockHashes, BlockHeader, BlockOutcome, BlockProcessor, BLOCK_HASH_WINDOW};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ExecutionError, ExecutionResult};
pub use executor::{Receipt, Transaction, TransactionExecutor};
pub use genesis::{Genesis, GenesisAccount};
pub use query::StateQuery;
pub use world::{Snapshot, WorldState};
