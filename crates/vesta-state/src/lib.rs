//! # vesta-state
//!
//! Journaled world state for the Vesta execution engine.
//!
//! This crate provides:
//! - a generic undo [`Journal`] with nested checkpoints
//! - [`StateStore`] (accounts) and [`StorageStore`] (slots), both caching
//!   reads and journaling writes until commit
//! - the [`Trie`] contract and a content-addressed [`FlatTrie`]
//! - key-value backends: [`MemoryDb`] and RocksDB ([`Database`])
//! - [`CodeStore`] for code by hash

#![warn(missing_docs)]
#![warn(clippy::all)]

mod account;
mod code;
mod db;
mod error;
pub mod journal;
pub mod kv;
mod state_store;
mod storage_store;
pub mod trie;

pub use account::Account;
pub use code::CodeStore;
pub use db::Database;
pub use error::{StateError, StateResult};
pub use journal::{Checkpoint, Journal, START_CAPACITY};
pub use kv::{KeyValueStore, MemoryDb, WriteBatch};
pub use state_store::StateStore;
pub use storage_store::StorageStore;
pub use trie::{FlatTrie, Trie, TrieChanges};
