//! Scenario files: a genesis allocation followed by blocks

use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vesta_executor::{Block, BlockOutcome, Engine, Genesis};
use vesta_primitives::H256;

/// Input file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    /// Initial allocation
    #[serde(default)]
    pub genesis: Genesis,
    /// Blocks in order
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// Printed result
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Root after genesis
    pub genesis_root: H256,
    /// Outcome of every block
    pub blocks: Vec<BlockOutcome>,
    /// Final head root
    pub state_root: H256,
}

impl Scenario {
    /// Read a scenario from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    /// Apply the genesis and process every block.
    ///
    /// Blocks without a number get their position (starting at 1); blocks
    /// without a gas limit get the configured one. Blocks at or below the
    /// head of a resumed store are skipped.
    pub fn run(mut self, engine: &mut Engine, cancel: &AtomicBool) -> Result<Report> {
        let genesis_root = engine
            .apply_genesis(&self.genesis)
            .context("failed to apply genesis")?;

        let gas_limit = engine.config().block_gas_limit;
        let head = engine.head_number();
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (index, block) in self.blocks.iter_mut().enumerate() {
            if block.header.number == 0 {
                block.header.number = index as u64 + 1;
            }
            if head.is_some_and(|head| block.header.number <= head) {
                tracing::info!(number = block.header.number, "block already processed, skipping");
                continue;
            }
            if block.header.gas_limit == 0 {
                block.header.gas_limit = gas_limit;
            }
            let outcome = engine
                .process_block(block, cancel)
                .with_context(|| format!("block {} failed", block.header.number))?;
            blocks.push(outcome);
        }

        Ok(Report {
            genesis_root,
            blocks,
            state_root: engine.state_root(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesta_executor::EngineConfig;
    use vesta_primitives::{Address, U256};

    const SCENARIO: &str = r#"{
        "genesis": {
            "accounts": {
                "0x0000000000000000000000000000000000000001": { "balance": "0xf4240" }
            }
        },
        "blocks": [
            {
                "transactions": [
                    {
                        "sender": "0x0000000000000000000000000000000000000001",
                        "to": "0x0000000000000000000000000000000000000002",
                        "value": "0x3e8",
                        "gas_limit": 21000,
                        "gas_price": "0x1"
                    }
                ]
            },
            {}
        ]
    }"#;

    #[test]
    fn test_run_scenario() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let mut engine = Engine::open(EngineConfig::default()).unwrap();
        let report = scenario.run(&mut engine, &AtomicBool::new(false)).unwrap();

        assert_eq!(report.blocks.len(), 2);
        assert_eq!(report.blocks[0].number, 1);
        assert_eq!(report.blocks[1].number, 2);
        assert_eq!(report.blocks[0].gas_used, 21_000);
        assert_eq!(report.state_root, report.blocks[1].state_root);
        assert_eq!(
            engine.query_head().balance(&Address::from_low_u64(2)).unwrap(),
            U256::from(1000)
        );
    }

    #[test]
    fn test_rerun_skips_processed_blocks() {
        let mut engine = Engine::open(EngineConfig::default()).unwrap();
        let cancel = AtomicBool::new(false);
        let first: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let first = first.run(&mut engine, &cancel).unwrap();

        let again: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let again = again.run(&mut engine, &cancel).unwrap();
        assert!(again.blocks.is_empty());
        assert_eq!(again.genesis_root, first.genesis_root);
        assert_eq!(again.state_root, first.state_root);
        assert_eq!(
            engine.query_head().balance(&Address::from_low_u64(1)).unwrap(),
            U256::from(1_000_000u64 - 1000 - 21_000)
        );
    }

    #[test]
    fn test_failed_block_reports_number() {
        let mut scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        scenario.blocks[0].transactions[0].nonce = 5;
        let mut engine = Engine::open(EngineConfig::default()).unwrap();
        let err = scenario
            .run(&mut engine, &AtomicBool::new(false))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("block 1 failed"));
        assert!(format!("{:#}", err).contains("nonce mismatch"));
    }
}
