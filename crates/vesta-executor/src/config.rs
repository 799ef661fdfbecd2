//! Engine configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vesta_evm::{ForkSchedule, DEFAULT_CODE_CACHE_CAPACITY};

use crate::error::{ExecutionError, ExecutionResult};

/// Engine configuration, usually loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Chain ID returned by CHAINID
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Fork activations by block height
    #[serde(default)]
    pub forks: ForkSchedule,
    /// Number of analyzed code blobs kept in memory
    #[serde(default = "default_code_cache_capacity")]
    pub code_cache_capacity: usize,
    /// Gas limit for blocks built from scenarios
    #[serde(default = "default_block_gas_limit")]
    pub block_gas_limit: u64,
    /// RocksDB directory; in-memory when absent
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_chain_id() -> u64 {
    1337
}

fn default_code_cache_capacity() -> usize {
    DEFAULT_CODE_CACHE_CAPACITY
}

fn default_block_gas_limit() -> u64 {
    30_000_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            forks: ForkSchedule::default(),
            code_cache_capacity: default_code_cache_capacity(),
            block_gas_limit: default_block_gas_limit(),
            data_dir: None,
        }
    }
}

impl EngineConfig {
    /// Parse from TOML text
    pub fn from_toml_str(s: &str) -> ExecutionResult<Self> {
        toml::from_str(s).map_err(|e| ExecutionError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ExecutionResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExecutionError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Builder: set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Builder: set the fork schedule
    pub fn with_forks(mut self, forks: ForkSchedule) -> Self {
        self.forks = forks;
        self
    }
}
