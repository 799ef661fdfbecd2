//! Gas cost calculations

use crate::capabilities::Capabilities;
use crate::opcode::Opcode;
use primitive_types::U256;

/// Gas costs
pub mod cost {
    /// Zero gas
    pub const ZERO: u64 = 0;
    /// Base gas
    pub const BASE: u64 = 2;
    /// Very low gas
    pub const VERYLOW: u64 = 3;
    /// Low gas
    pub const LOW: u64 = 5;
    /// Mid gas
    pub const MID: u64 = 8;
    /// High gas
    pub const HIGH: u64 = 10;

    /// Jump dest gas
    pub const JUMPDEST: u64 = 1;
    /// BEGINSUB gas
    pub const BEGINSUB: u64 = 2;
    /// RETURNSUB gas
    pub const RETURNSUB: u64 = 5;
    /// JUMPSUB gas
    pub const JUMPSUB: u64 = 10;
    /// Exp gas
    pub const EXP: u64 = 10;
    /// Exp byte gas (Frontier)
    pub const EXP_BYTE_FRONTIER: u64 = 10;
    /// Exp byte gas (EIP-160)
    pub const EXP_BYTE: u64 = 50;
    /// SHA3 base gas
    pub const SHA3: u64 = 30;
    /// SHA3 word gas
    pub const SHA3_WORD: u64 = 6;
    /// BLOCKHASH gas
    pub const BLOCKHASH: u64 = 20;

    /// Balance gas (Frontier)
    pub const BALANCE_FRONTIER: u64 = 20;
    /// Balance gas (EIP-150)
    pub const BALANCE_EIP150: u64 = 400;
    /// Balance gas (EIP-1884)
    pub const BALANCE_EIP1884: u64 = 700;
    /// Ext code size / copy gas (Frontier)
    pub const EXTCODE_FRONTIER: u64 = 20;
    /// Ext code size / copy gas (EIP-150)
    pub const EXTCODE_EIP150: u64 = 700;
    /// Ext code hash gas
    pub const EXTCODEHASH: u64 = 400;
    /// Ext code hash gas (EIP-1884)
    pub const EXTCODEHASH_EIP1884: u64 = 700;

    /// Sload gas (Frontier)
    pub const SLOAD_FRONTIER: u64 = 50;
    /// Sload gas (EIP-150)
    pub const SLOAD_EIP150: u64 = 200;
    /// Sload gas (EIP-1884)
    pub const SLOAD_EIP1884: u64 = 800;
    /// Sstore set gas
    pub const SSTORE_SET: u64 = 20000;
    /// Sstore reset gas
    pub const SSTORE_RESET: u64 = 5000;
    /// Sstore clear refund
    pub const SSTORE_CLEAR_REFUND: u64 = 15000;
    /// Sstore clear refund (EIP-3529)
    pub const SSTORE_CLEAR_REFUND_EIP3529: u64 = 4800;
    /// Gas left below which SSTORE always fails (EIP-2200)
    pub const SSTORE_SENTRY: u64 = 2300;

    /// Log gas
    pub const LOG: u64 = 375;
    /// Log topic gas
    pub const LOG_TOPIC: u64 = 375;
    /// Log data gas (per byte)
    pub const LOG_DATA: u64 = 8;

    /// Create gas
    pub const CREATE: u64 = 32000;
    /// Code deposit gas (per byte)
    pub const CODE_DEPOSIT: u64 = 200;
    /// Call gas (Frontier)
    pub const CALL_FRONTIER: u64 = 40;
    /// Call gas (EIP-150)
    pub const CALL_EIP150: u64 = 700;
    /// Call value transfer gas
    pub const CALL_VALUE: u64 = 9000;
    /// Call new account gas
    pub const CALL_NEW_ACCOUNT: u64 = 25000;
    /// Call stipend
    pub const CALL_STIPEND: u64 = 2300;

    /// Memory gas per word
    pub const MEMORY: u64 = 3;
    /// Copy gas per word
    pub const COPY: u64 = 3;

    /// Transaction gas
    pub const TX: u64 = 21000;
    /// Transaction create gas
    pub const TX_CREATE: u64 = 32000;
    /// Transaction data zero byte
    pub const TX_DATA_ZERO: u64 = 4;
    /// Transaction data non-zero byte (Frontier)
    pub const TX_DATA_NONZERO_FRONTIER: u64 = 68;
    /// Transaction data non-zero byte (EIP-2028)
    pub const TX_DATA_NONZERO: u64 = 16;

    /// Selfdestruct gas (EIP-150)
    pub const SELFDESTRUCT: u64 = 5000;
    /// Selfdestruct new account gas
    pub const SELFDESTRUCT_NEW_ACCOUNT: u64 = 25000;
    /// Selfdestruct refund
    pub const SELFDESTRUCT_REFUND: u64 = 24000;

    /// Max call depth
    pub const MAX_CALL_DEPTH: usize = 1024;
    /// Max stack size
    pub const MAX_STACK_SIZE: usize = 1024;
    /// Max subroutine return stack size
    pub const MAX_RETURN_STACK_SIZE: usize = 1023;
    /// Max code size (EIP-170)
    pub const MAX_CODE_SIZE: usize = 24576;
}

/// Static gas charged before an opcode executes
pub fn static_gas(opcode: Opcode, caps: &Capabilities) -> u64 {
    use Opcode::*;
    match opcode {
        STOP | RETURN | REVERT | INVALID | SSTORE => cost::ZERO,

        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE
        | COINBASE | TIMESTAMP | NUMBER | DIFFICULTY | GASLIMIT | CHAINID | RETURNDATASIZE
        | POP | PC | MSIZE | GAS | BASEFEE | PUSH0 => cost::BASE,

        ADD | SUB | NOT | LT | GT | SLT | SGT | EQ | ISZERO | AND | OR | XOR | BYTE | SHL
        | SHR | SAR | CALLDATALOAD | MLOAD | MSTORE | MSTORE8 | CALLDATACOPY | CODECOPY
        | RETURNDATACOPY => cost::VERYLOW,

        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND | SELFBALANCE => cost::LOW,
        ADDMOD | MULMOD | JUMP => cost::MID,
        JUMPI => cost::HIGH,
        JUMPDEST => cost::JUMPDEST,
        BEGINSUB => cost::BEGINSUB,
        RETURNSUB => cost::RETURNSUB,
        JUMPSUB => cost::JUMPSUB,

        EXP => cost::EXP,
        KECCAK256 => cost::SHA3,
        BLOCKHASH => cost::BLOCKHASH,

        BALANCE => {
            if caps.eip1884 {
                cost::BALANCE_EIP1884
            } else if caps.eip150 {
                cost::BALANCE_EIP150
            } else {
                cost::BALANCE_FRONTIER
            }
        }
        EXTCODESIZE | EXTCODECOPY => {
            if caps.eip150 {
                cost::EXTCODE_EIP150
            } else {
                cost::EXTCODE_FRONTIER
            }
        }
        EXTCODEHASH => {
            if caps.eip1884 {
                cost::EXTCODEHASH_EIP1884
            } else {
                cost::EXTCODEHASH
            }
        }
        SLOAD => {
            if caps.eip1884 {
                cost::SLOAD_EIP1884
            } else if caps.eip150 {
                cost::SLOAD_EIP150
            } else {
                cost::SLOAD_FRONTIER
            }
        }

        CREATE | CREATE2 => cost::CREATE,
        CALL | CALLCODE | DELEGATECALL | STATICCALL => {
            if caps.eip150 {
                cost::CALL_EIP150
            } else {
                cost::CALL_FRONTIER
            }
        }
        SELFDESTRUCT => {
            if caps.eip150 {
                cost::SELFDESTRUCT
            } else {
                cost::ZERO
            }
        }

        op if op.is_log() => cost::LOG + cost::LOG_TOPIC * op.log_topics() as u64,
        // PUSH1..PUSH32, DUP, SWAP
        _ => cost::VERYLOW,
    }
}

/// Number of 32-byte words covering `length` bytes
pub fn words(length: usize) -> u64 {
    length.div_ceil(32) as u64
}

/// Calculate memory expansion cost
pub fn memory_gas(current_size: usize, new_size: usize) -> u64 {
    if new_size <= current_size {
        return 0;
    }
    let new_cost = memory_word_cost(words(new_size));
    let old_cost = memory_word_cost(words(current_size));
    new_cost.saturating_sub(old_cost)
}

/// Calculate memory cost for a number of words
fn memory_word_cost(words: u64) -> u64 {
    cost::MEMORY
        .saturating_mul(words)
        .saturating_add(words.saturating_mul(words) / 512)
}

/// Calculate copy cost (for CALLDATACOPY, CODECOPY, etc.)
pub fn copy_gas(length: usize) -> u64 {
    cost::COPY.saturating_mul(words(length))
}

/// Dynamic EXP cost for the exponent's byte length
pub fn exp_gas(exponent: &U256, caps: &Capabilities) -> u64 {
    let byte_size = (exponent.bits() as u64).div_ceil(8);
    let per_byte = if caps.eip160 {
        cost::EXP_BYTE
    } else {
        cost::EXP_BYTE_FRONTIER
    };
    per_byte * byte_size
}

/// Dynamic KECCAK256 cost
pub fn sha3_gas(length: usize) -> u64 {
    cost::SHA3_WORD.saturating_mul(words(length))
}

/// Dynamic LOG cost (data bytes only)
pub fn log_data_gas(data_size: usize) -> u64 {
    cost::LOG_DATA.saturating_mul(data_size as u64)
}

/// Gas available to a sub-call (EIP-150 all but one 64th)
pub fn all_but_one_64th(gas: u64) -> u64 {
    gas - gas / 64
}

/// Intrinsic cost of a transaction
pub fn intrinsic_gas(data: &[u8], is_create: bool, caps: &Capabilities) -> u64 {
    let nonzero_cost = if caps.eip2028 {
        cost::TX_DATA_NONZERO
    } else {
        cost::TX_DATA_NONZERO_FRONTIER
    };
    let data_cost: u64 = data
        .iter()
        .map(|&b| if b == 0 { cost::TX_DATA_ZERO } else { nonzero_cost })
        .sum();
    let create_cost = if is_create && caps.eip2 {
        cost::TX_CREATE
    } else {
        0
    };
    cost::TX + create_cost + data_cost
}

/// Cost and refund delta of an SSTORE
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SstoreCost {
    /// Gas charged
    pub gas: u64,
    /// Change to the refund counter
    pub refund: i64,
}

/// Price an SSTORE from the slot's original, current and new values.
///
/// `original` is the value at the start of the transaction.
pub fn sstore_cost(original: U256, current: U256, new: U256, caps: &Capabilities) -> SstoreCost {
    let clear_refund = if caps.eip3529 {
        cost::SSTORE_CLEAR_REFUND_EIP3529
    } else {
        cost::SSTORE_CLEAR_REFUND
    } as i64;

    if !caps.eip2200 {
        let gas = if current.is_zero() && !new.is_zero() {
            cost::SSTORE_SET
        } else {
            cost::SSTORE_RESET
        };
        let refund = if !current.is_zero() && new.is_zero() {
            clear_refund
        } else {
            0
        };
        return SstoreCost { gas, refund };
    }

    let sload = cost::SLOAD_EIP1884;
    if current == new {
        return SstoreCost { gas: sload, refund: 0 };
    }
    if original == current {
        if original.is_zero() {
            return SstoreCost { gas: cost::SSTORE_SET, refund: 0 };
        }
        let refund = if new.is_zero() { clear_refund } else { 0 };
        return SstoreCost { gas: cost::SSTORE_RESET, refund };
    }

    // Dirty slot
    let mut refund = 0i64;
    if !original.is_zero() {
        if current.is_zero() {
            refund -= clear_refund;
        } else if new.is_zero() {
            refund += clear_refund;
        }
    }
    if original == new {
        refund += if original.is_zero() {
            (cost::SSTORE_SET - sload) as i64
        } else {
            (cost::SSTORE_RESET - sload) as i64
        };
    }
    SstoreCost { gas: sload, refund }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_gas() {
        let caps = Capabilities::istanbul();
        assert_eq!(static_gas(Opcode::STOP, &caps), 0);
        assert_eq!(static_gas(Opcode::ADD, &caps), 3);
        assert_eq!(static_gas(Opcode::MUL, &caps), 5);
        assert_eq!(static_gas(Opcode::JUMP, &caps), 8);
        assert_eq!(static_gas(Opcode::JUMPI, &caps), 10);
        assert_eq!(static_gas(Opcode::PUSH32, &caps), 3);
        assert_eq!(static_gas(Opcode::LOG2, &caps), 375 * 3);
    }

    #[test]
    fn test_fork_dependent_costs() {
        let frontier = Capabilities::frontier();
        let tangerine = Capabilities::tangerine_whistle();
        let istanbul = Capabilities::istanbul();
        assert_eq!(static_gas(Opcode::SLOAD, &frontier), 50);
        assert_eq!(static_gas(Opcode::SLOAD, &tangerine), 200);
        assert_eq!(static_gas(Opcode::SLOAD, &istanbul), 800);
        assert_eq!(static_gas(Opcode::BALANCE, &istanbul), 700);
        assert_eq!(static_gas(Opcode::CALL, &frontier), 40);
        assert_eq!(static_gas(Opcode::CALL, &istanbul), 700);
        assert_eq!(static_gas(Opcode::SELFDESTRUCT, &frontier), 0);
    }

    #[test]
    fn test_memory_gas() {
        assert_eq!(memory_gas(32, 32), 0);
        assert_eq!(memory_gas(0, 32), 3);
        assert_eq!(memory_gas(0, 64), 6);
        // 1024 words: 3 * 1024 + 1024^2 / 512
        assert_eq!(memory_gas(0, 32 * 1024), 3 * 1024 + 2048);
        assert_eq!(memory_gas(32, 64), 3);
    }

    #[test]
    fn test_copy_and_sha3_gas() {
        assert_eq!(copy_gas(0), 0);
        assert_eq!(copy_gas(1), 3);
        assert_eq!(copy_gas(33), 6);
        assert_eq!(sha3_gas(32), 6);
        assert_eq!(log_data_gas(10), 80);
    }

    #[test]
    fn test_exp_gas() {
        let caps = Capabilities::spurious_dragon();
        assert_eq!(exp_gas(&U256::zero(), &caps), 0);
        assert_eq!(exp_gas(&U256::from(0xFFu64), &caps), 50);
        assert_eq!(exp_gas(&U256::from(0x100u64), &caps), 100);
        assert_eq!(exp_gas(&U256::MAX, &caps), 32 * 50);
        assert_eq!(exp_gas(&U256::from(0x100u64), &Capabilities::frontier()), 20);
    }

    #[test]
    fn test_intrinsic_gas() {
        let frontier = Capabilities::frontier();
        let istanbul = Capabilities::istanbul();
        assert_eq!(intrinsic_gas(&[], false, &istanbul), 21000);
        assert_eq!(intrinsic_gas(&[0, 1], false, &frontier), 21000 + 4 + 68);
        assert_eq!(intrinsic_gas(&[0, 1], false, &istanbul), 21000 + 4 + 16);
        assert_eq!(intrinsic_gas(&[], true, &frontier), 21000);
        assert_eq!(intrinsic_gas(&[], true, &istanbul), 53000);
    }

    #[test]
    fn test_all_but_one_64th() {
        assert_eq!(all_but_one_64th(6400), 6300);
        assert_eq!(all_but_one_64th(63), 63);
    }

    // ==================== SSTORE ====================

    fn u(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_sstore_legacy() {
        let caps = Capabilities::byzantium();
        assert_eq!(sstore_cost(u(0), u(0), u(1), &caps), SstoreCost { gas: 20000, refund: 0 });
        assert_eq!(sstore_cost(u(1), u(1), u(2), &caps), SstoreCost { gas: 5000, refund: 0 });
        assert_eq!(sstore_cost(u(1), u(1), u(0), &caps), SstoreCost { gas: 5000, refund: 15000 });
        assert_eq!(sstore_cost(u(0), u(0), u(0), &caps), SstoreCost { gas: 5000, refund: 0 });
    }

    #[test]
    fn test_sstore_net_metering() {
        let caps = Capabilities::istanbul();
        // No-op
        assert_eq!(sstore_cost(u(1), u(1), u(1), &caps), SstoreCost { gas: 800, refund: 0 });
        // Fresh slot
        assert_eq!(sstore_cost(u(0), u(0), u(1), &caps), SstoreCost { gas: 20000, refund: 0 });
        // Clean clear
        assert_eq!(sstore_cost(u(1), u(1), u(0), &caps), SstoreCost { gas: 5000, refund: 15000 });
        // Dirty slot restored to an original zero
        assert_eq!(sstore_cost(u(0), u(1), u(0), &caps), SstoreCost { gas: 800, refund: 19200 });
        // Dirty slot un-cleared
        assert_eq!(sstore_cost(u(1), u(0), u(2), &caps), SstoreCost { gas: 800, refund: -15000 });
        // Dirty slot restored to its original non-zero value
        assert_eq!(sstore_cost(u(1), u(2), u(1), &caps), SstoreCost { gas: 800, refund: 4200 });
    }
}
