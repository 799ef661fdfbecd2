//! Fork capabilities
//!
//! Protocol upgrades are described by a flat [`Capabilities`] record of
//! named flags. A [`ForkSchedule`] maps block heights to the record that
//! applies there; the executor resolves it once per block and hands the
//! result to every frame.

use serde::{Deserialize, Serialize};

/// Flags consulted by the interpreter and executor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Contract creation costs 32000 intrinsic gas; failed code deposit fails the create
    pub eip2: bool,
    /// DELEGATECALL
    pub eip7: bool,
    /// IO repricing and all-but-one-64th call gas
    pub eip150: bool,
    /// Touched empty accounts are removed
    pub eip158: bool,
    /// EXP costs 50 per exponent byte
    pub eip160: bool,
    /// Deployed code is limited to 24576 bytes
    pub eip170: bool,
    /// REVERT
    pub eip140: bool,
    /// RETURNDATASIZE and RETURNDATACOPY
    pub eip211: bool,
    /// STATICCALL
    pub eip214: bool,
    /// Receipts carry a status flag instead of a state root
    pub eip658: bool,
    /// SHL, SHR and SAR
    pub eip145: bool,
    /// CREATE2
    pub eip1014: bool,
    /// EXTCODEHASH
    pub eip1052: bool,
    /// CHAINID
    pub eip1344: bool,
    /// SLOAD, BALANCE and EXTCODEHASH repricing, SELFBALANCE
    pub eip1884: bool,
    /// Non-zero calldata bytes cost 16
    pub eip2028: bool,
    /// Net gas metering for SSTORE
    pub eip2200: bool,
    /// BEGINSUB, RETURNSUB and JUMPSUB
    pub subroutines: bool,
    /// BASEFEE
    pub eip3198: bool,
    /// Reduced refunds, no SELFDESTRUCT refund
    pub eip3529: bool,
    /// New code starting with 0xEF is rejected
    pub eip3541: bool,
    /// PUSH0
    pub eip3855: bool,
}

impl Capabilities {
    /// Frontier rules
    pub fn frontier() -> Self {
        Self::default()
    }

    /// Homestead rules
    pub fn homestead() -> Self {
        Self {
            eip2: true,
            eip7: true,
            ..Self::frontier()
        }
    }

    /// Tangerine Whistle rules
    pub fn tangerine_whistle() -> Self {
        Self {
            eip150: true,
            ..Self::homestead()
        }
    }

    /// Spurious Dragon rules
    pub fn spurious_dragon() -> Self {
        Self {
            eip158: true,
            eip160: true,
            eip170: true,
            ..Self::tangerine_whistle()
        }
    }

    /// Byzantium rules
    pub fn byzantium() -> Self {
        Self {
            eip140: true,
            eip211: true,
            eip214: true,
            eip658: true,
            ..Self::spurious_dragon()
        }
    }

    /// Constantinople rules (as amended by Petersburg)
    pub fn constantinople() -> Self {
        Self {
            eip145: true,
            eip1014: true,
            eip1052: true,
            ..Self::byzantium()
        }
    }

    /// Istanbul rules
    pub fn istanbul() -> Self {
        Self {
            eip1344: true,
            eip1884: true,
            eip2028: true,
            eip2200: true,
            ..Self::constantinople()
        }
    }

    /// Berlin rules, with subroutines
    pub fn berlin() -> Self {
        Self {
            subroutines: true,
            ..Self::istanbul()
        }
    }

    /// Shanghai rules; subroutines are withdrawn again
    pub fn shanghai() -> Self {
        Self {
            subroutines: false,
            eip3198: true,
            eip3529: true,
            eip3541: true,
            eip3855: true,
            ..Self::berlin()
        }
    }

    /// Divisor applied to gas used when capping refunds
    pub fn max_refund_quotient(&self) -> u64 {
        if self.eip3529 {
            5
        } else {
            2
        }
    }
}

/// Named protocol upgrades
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fork {
    /// Launch rules
    Frontier,
    /// Homestead
    Homestead,
    /// Tangerine Whistle
    TangerineWhistle,
    /// Spurious Dragon
    SpuriousDragon,
    /// Byzantium
    Byzantium,
    /// Constantinople / Petersburg
    Constantinople,
    /// Istanbul
    Istanbul,
    /// Berlin
    Berlin,
    /// Shanghai
    Shanghai,
}

impl Fork {
    /// Capability record of this fork
    pub fn capabilities(self) -> Capabilities {
        match self {
            Fork::Frontier => Capabilities::frontier(),
            Fork::Homestead => Capabilities::homestead(),
            Fork::TangerineWhistle => Capabilities::tangerine_whistle(),
            Fork::SpuriousDragon => Capabilities::spurious_dragon(),
            Fork::Byzantium => Capabilities::byzantium(),
            Fork::Constantinople => Capabilities::constantinople(),
            Fork::Istanbul => Capabilities::istanbul(),
            Fork::Berlin => Capabilities::berlin(),
            Fork::Shanghai => Capabilities::shanghai(),
        }
    }
}

/// A fork taking effect at a block height
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkActivation {
    /// Upgrade being activated
    pub fork: Fork,
    /// First block running under the upgrade
    pub block: u64,
}

/// Block height to capabilities resolution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForkSchedule {
    activations: Vec<ForkActivation>,
}

impl ForkSchedule {
    /// Build a schedule from activations in any order
    pub fn new(mut activations: Vec<ForkActivation>) -> Self {
        activations.sort_by_key(|a| a.block);
        Self { activations }
    }

    /// A single fork active from genesis
    pub fn single(fork: Fork) -> Self {
        Self::new(vec![ForkActivation { fork, block: 0 }])
    }

    /// Activations in block order
    pub fn activations(&self) -> &[ForkActivation] {
        &self.activations
    }

    /// Fork in effect at `block`; Frontier before the first activation
    pub fn fork_at(&self, block: u64) -> Fork {
        self.activations
            .iter()
            .filter(|a| a.block <= block)
            .max_by_key(|a| a.block)
            .map_or(Fork::Frontier, |a| a.fork)
    }

    /// Capabilities in effect at `block`
    pub fn capabilities_at(&self, block: u64) -> Capabilities {
        self.fork_at(block).capabilities()
    }
}

impl Default for ForkSchedule {
    fn default() -> Self {
        Self::single(Fork::Shanghai)
    }
}
