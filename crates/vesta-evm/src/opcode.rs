//! Opcode definitions
//!
//! The opcode list is written once; `define_opcodes!` expands it into the
//! `#[repr(u8)]` enum, a 256-entry decode table and the mnemonic lookup.

use std::fmt;

use crate::capabilities::Capabilities;

macro_rules! define_opcodes {
    ($($name:ident = $byte:literal),* $(,)?) => {
        /// Opcodes (see Yellow Paper Appendix H)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum Opcode {
            $($name = $byte,)*
        }

        /// Decode table; `None` marks undefined bytes
        const DECODE: [Option<Opcode>; 256] = {
            let mut table = [None; 256];
            $(table[$byte] = Some(Opcode::$name);)*
            table
        };

        impl Opcode {
            /// Mnemonic
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name),)*
                }
            }
        }
    };
}

define_opcodes! {
    // 0x00: stop and arithmetic
    STOP = 0x00, ADD = 0x01, MUL = 0x02, SUB = 0x03, DIV = 0x04, SDIV = 0x05,
    MOD = 0x06, SMOD = 0x07, ADDMOD = 0x08, MULMOD = 0x09, EXP = 0x0A, SIGNEXTEND = 0x0B,

    // 0x10: comparison and bitwise logic
    LT = 0x10, GT = 0x11, SLT = 0x12, SGT = 0x13, EQ = 0x14, ISZERO = 0x15,
    AND = 0x16, OR = 0x17, XOR = 0x18, NOT = 0x19, BYTE = 0x1A,
    SHL = 0x1B, SHR = 0x1C, SAR = 0x1D,

    KECCAK256 = 0x20,

    // 0x30: environment
    ADDRESS = 0x30, BALANCE = 0x31, ORIGIN = 0x32, CALLER = 0x33, CALLVALUE = 0x34,
    CALLDATALOAD = 0x35, CALLDATASIZE = 0x36, CALLDATACOPY = 0x37,
    CODESIZE = 0x38, CODECOPY = 0x39, GASPRICE = 0x3A,
    EXTCODESIZE = 0x3B, EXTCODECOPY = 0x3C,
    RETURNDATASIZE = 0x3D, RETURNDATACOPY = 0x3E, EXTCODEHASH = 0x3F,

    // 0x40: block
    BLOCKHASH = 0x40, COINBASE = 0x41, TIMESTAMP = 0x42, NUMBER = 0x43,
    DIFFICULTY = 0x44, GASLIMIT = 0x45, CHAINID = 0x46, SELFBALANCE = 0x47, BASEFEE = 0x48,

    // 0x50: stack, memory, storage and flow
    POP = 0x50, MLOAD = 0x51, MSTORE = 0x52, MSTORE8 = 0x53, SLOAD = 0x54, SSTORE = 0x55,
    JUMP = 0x56, JUMPI = 0x57, PC = 0x58, MSIZE = 0x59, GAS = 0x5A, JUMPDEST = 0x5B,
    BEGINSUB = 0x5C, RETURNSUB = 0x5D, JUMPSUB = 0x5E,

    PUSH0 = 0x5F,
    PUSH1 = 0x60, PUSH2 = 0x61, PUSH3 = 0x62, PUSH4 = 0x63,
    PUSH5 = 0x64, PUSH6 = 0x65, PUSH7 = 0x66, PUSH8 = 0x67,
    PUSH9 = 0x68, PUSH10 = 0x69, PUSH11 = 0x6A, PUSH12 = 0x6B,
    PUSH13 = 0x6C, PUSH14 = 0x6D, PUSH15 = 0x6E, PUSH16 = 0x6F,
    PUSH17 = 0x70, PUSH18 = 0x71, PUSH19 = 0x72, PUSH20 = 0x73,
    PUSH21 = 0x74, PUSH22 = 0x75, PUSH23 = 0x76, PUSH24 = 0x77,
    PUSH25 = 0x78, PUSH26 = 0x79, PUSH27 = 0x7A, PUSH28 = 0x7B,
    PUSH29 = 0x7C, PUSH30 = 0x7D, PUSH31 = 0x7E, PUSH32 = 0x7F,

    DUP1 = 0x80, DUP2 = 0x81, DUP3 = 0x82, DUP4 = 0x83,
    DUP5 = 0x84, DUP6 = 0x85, DUP7 = 0x86, DUP8 = 0x87,
    DUP9 = 0x88, DUP10 = 0x89, DUP11 = 0x8A, DUP12 = 0x8B,
    DUP13 = 0x8C, DUP14 = 0x8D, DUP15 = 0x8E, DUP16 = 0x8F,

    SWAP1 = 0x90, SWAP2 = 0x91, SWAP3 = 0x92, SWAP4 = 0x93,
    SWAP5 = 0x94, SWAP6 = 0x95, SWAP7 = 0x96, SWAP8 = 0x97,
    SWAP9 = 0x98, SWAP10 = 0x99, SWAP11 = 0x9A, SWAP12 = 0x9B,
    SWAP13 = 0x9C, SWAP14 = 0x9D, SWAP15 = 0x9E, SWAP16 = 0x9F,

    LOG0 = 0xA0, LOG1 = 0xA1, LOG2 = 0xA2, LOG3 = 0xA3, LOG4 = 0xA4,

    // 0xF0: system
    CREATE = 0xF0, CALL = 0xF1, CALLCODE = 0xF2, RETURN = 0xF3, DELEGATECALL = 0xF4,
    CREATE2 = 0xF5, STATICCALL = 0xFA, REVERT = 0xFD, INVALID = 0xFE, SELFDESTRUCT = 0xFF,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Opcode {
    /// Decode a byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        DECODE[byte as usize]
    }

    /// Get PUSH operand size (1-32 for PUSH1-PUSH32, 0 otherwise)
    pub fn push_size(self) -> usize {
        let byte = self as u8;
        if (0x60..=0x7F).contains(&byte) {
            (byte - 0x5F) as usize
        } else {
            0
        }
    }

    /// Check if this is a PUSH opcode (PUSH0 included)
    pub fn is_push(self) -> bool {
        let byte = self as u8;
        (0x5F..=0x7F).contains(&byte)
    }

    /// Get DUP depth (1-16 for DUP1-DUP16, 0 otherwise)
    pub fn dup_depth(self) -> usize {
        let byte = self as u8;
        if (0x80..=0x8F).contains(&byte) {
            (byte - 0x7F) as usize
        } else {
            0
        }
    }

    /// Get SWAP depth (1-16 for SWAP1-SWAP16, 0 otherwise)
    pub fn swap_depth(self) -> usize {
        let byte = self as u8;
        if (0x90..=0x9F).contains(&byte) {
            (byte - 0x8F) as usize
        } else {
            0
        }
    }

    /// Check if this is a LOG opcode
    pub fn is_log(self) -> bool {
        let byte = self as u8;
        (0xA0..=0xA4).contains(&byte)
    }

    /// Get LOG topic count (0-4 for LOG0-LOG4, 0 otherwise)
    pub fn log_topics(self) -> usize {
        if self.is_log() {
            (self as u8 - 0xA0) as usize
        } else {
            0
        }
    }

    /// Number of stack items consumed and produced
    pub fn stack_io(self) -> (usize, usize) {
        use Opcode::*;
        match self {
            STOP | JUMPDEST | BEGINSUB | RETURNSUB | INVALID => (0, 0),

            ADD | MUL | SUB | DIV | SDIV | MOD | SMOD | EXP | SIGNEXTEND => (2, 1),
            ADDMOD | MULMOD => (3, 1),
            LT | GT | SLT | SGT | EQ | AND | OR | XOR | BYTE | SHL | SHR | SAR => (2, 1),
            ISZERO | NOT => (1, 1),
            KECCAK256 => (2, 1),

            ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE
            | RETURNDATASIZE | COINBASE | TIMESTAMP | NUMBER | DIFFICULTY | GASLIMIT
            | CHAINID | SELFBALANCE | BASEFEE | PC | MSIZE | GAS | PUSH0 => (0, 1),
            BALANCE | CALLDATALOAD | EXTCODESIZE | EXTCODEHASH | BLOCKHASH => (1, 1),
            CALLDATACOPY | CODECOPY | RETURNDATACOPY => (3, 0),
            EXTCODECOPY => (4, 0),

            POP | JUMP | JUMPSUB | SELFDESTRUCT => (1, 0),
            MLOAD | SLOAD => (1, 1),
            MSTORE | MSTORE8 | SSTORE | JUMPI | RETURN | REVERT => (2, 0),

            CREATE => (3, 1),
            CREATE2 => (4, 1),
            CALL | CALLCODE => (7, 1),
            DELEGATECALL | STATICCALL => (6, 1),

            op if op.push_size() > 0 => (0, 1),
            op if op.dup_depth() > 0 => (op.dup_depth(), op.dup_depth() + 1),
            op if op.swap_depth() > 0 => (op.swap_depth() + 1, op.swap_depth() + 1),
            op => (op.log_topics() + 2, 0),
        }
    }

    /// Whether the opcode is defined under `caps`
    pub fn is_enabled(self, caps: &Capabilities) -> bool {
        use Opcode::*;
        match self {
            DELEGATECALL => caps.eip7,
            REVERT => caps.eip140,
            RETURNDATASIZE | RETURNDATACOPY => caps.eip211,
            STATICCALL => caps.eip214,
            SHL | SHR | SAR => caps.eip145,
            CREATE2 => caps.eip1014,
            EXTCODEHASH => caps.eip1052,
            CHAINID => caps.eip1344,
            SELFBALANCE => caps.eip1884,
            BASEFEE => caps.eip3198,
            PUSH0 => caps.eip3855,
            BEGINSUB | RETURNSUB | JUMPSUB => caps.subroutines,
            _ => true,
        }
    }

    /// Whether the opcode modifies state (forbidden in static frames)
    pub fn writes_state(self) -> bool {
        matches!(
            self,
            Opcode::SSTORE | Opcode::CREATE | Opcode::CREATE2 | Opcode::SELFDESTRUCT
        ) || self.is_log()
    }
}
