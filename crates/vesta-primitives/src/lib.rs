//! # vesta-primitives
//!
//! Primitive types shared by the Vesta execution engine.
//!
//! This crate provides:
//! - 20-byte addresses and 256-bit hashes
//! - keccak hashing and the empty code / empty tree constants
//! - contract address derivation
//! - the byte encoding of storage values
//! - hex serde helpers for byte strings

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;
pub mod serde_hex;
pub mod word;

pub use address::{create2_address, create_address, Address, AddressError};
pub use error::PrimitiveError;
pub use hash::{keccak256, HashError, EMPTY_CODE_HASH, EMPTY_TRIE_ROOT, H256};

// Re-export primitive-types for U256
pub use primitive_types::U256;

/// Raw byte string (code, call data, return data, storage values)
pub type Bytes = Vec<u8>;

/// Block height type
pub type BlockHeight = u64;

/// Account nonce type
pub type Nonce = u64;

/// Gas type
pub type Gas = u64;
