//! Operand stack and word arithmetic

use crate::error::Fault;
use crate::gas::cost::MAX_STACK_SIZE;
use primitive_types::{U256, U512};

/// Operand stack (max 1024 items, 256-bit each)
#[derive(Clone, Debug)]
pub struct Stack {
    data: Vec<U256>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(MAX_STACK_SIZE),
        }
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: U256) -> Result<(), Fault> {
        if self.data.len() >= MAX_STACK_SIZE {
            return Err(Fault::StackOverflow);
        }
        self.data.push(value);
        Ok(())
    }

    /// Pop a value from the stack
    pub fn pop(&mut self) -> Result<U256, Fault> {
        self.data.pop().ok_or(Fault::StackUnderflow)
    }

    /// Peek at the top of the stack
    pub fn peek(&self) -> Result<&U256, Fault> {
        self.data.last().ok_or(Fault::StackUnderflow)
    }

    /// Peek at a specific depth (0 = top)
    pub fn peek_at(&self, depth: usize) -> Result<&U256, Fault> {
        if depth >= self.data.len() {
            return Err(Fault::StackUnderflow);
        }
        Ok(&self.data[self.data.len() - 1 - depth])
    }

    /// Swap top with item at depth (1 = swap with second item)
    pub fn swap(&mut self, depth: usize) -> Result<(), Fault> {
        let len = self.data.len();
        if depth == 0 || depth >= len {
            return Err(Fault::StackUnderflow);
        }
        self.data.swap(len - 1, len - 1 - depth);
        Ok(())
    }

    /// Duplicate item at depth to top (1 = dup top)
    pub fn dup(&mut self, depth: usize) -> Result<(), Fault> {
        if depth == 0 || depth > self.data.len() {
            return Err(Fault::StackUnderflow);
        }
        if self.data.len() >= MAX_STACK_SIZE {
            return Err(Fault::StackOverflow);
        }
        let value = self.data[self.data.len() - depth];
        self.data.push(value);
        Ok(())
    }

    /// Get current stack size
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if stack is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Word helpers ====================

/// Convert a word to usize, `None` if it does not fit
pub fn to_usize(value: &U256) -> Option<usize> {
    if value.bits() > 64 {
        return None;
    }
    usize::try_from(value.low_u64()).ok()
}

/// Convert a word to u64, saturating at `u64::MAX`
pub fn saturating_u64(value: &U256) -> u64 {
    if value.bits() > 64 {
        u64::MAX
    } else {
        value.low_u64()
    }
}

/// Boolean as a word
pub fn from_bool(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}

// ==================== Signed arithmetic ====================

/// Check if a value is negative in two's complement
fn is_negative(v: &U256) -> bool {
    v.bit(255)
}

/// Two's complement negation: ~v + 1
fn twos_complement(v: U256) -> U256 {
    (!v).overflowing_add(U256::one()).0
}

fn abs(v: U256) -> U256 {
    if is_negative(&v) {
        twos_complement(v)
    } else {
        v
    }
}

/// Signed division (two's complement), zero on division by zero
pub fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let result = abs(a) / abs(b);
    if is_negative(&a) != is_negative(&b) {
        twos_complement(result)
    } else {
        result
    }
}

/// Signed modulo (sign of dividend), zero on modulo by zero
pub fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let result = abs(a) % abs(b);
    if is_negative(&a) {
        twos_complement(result)
    } else {
        result
    }
}

fn narrow(v: U512) -> U256 {
    // The caller reduced modulo a 256-bit value
    U256::try_from(v).unwrap_or(U256::MAX)
}

/// (a + b) % n without intermediate overflow
pub fn addmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    narrow((U512::from(a) + U512::from(b)) % U512::from(n))
}

/// (a * b) % n without intermediate overflow
pub fn mulmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    narrow(a.full_mul(b) % U512::from(n))
}

/// Exponentiation modulo 2^256
pub fn exp(base: U256, exponent: U256) -> U256 {
    base.overflowing_pow(exponent).0
}

/// SIGNEXTEND: sign-extend `x` from byte `b` (0 = least significant)
pub fn signextend(b: U256, x: U256) -> U256 {
    if b >= U256::from(31) {
        return x;
    }
    let bit = b.low_u64() as usize * 8 + 7;
    let mask = (U256::one() << bit) - U256::one();
    if x.bit(bit) {
        x | !mask
    } else {
        x & mask
    }
}

/// BYTE: extract byte `i` of `x` (0 = most significant)
pub fn byte(i: U256, x: U256) -> U256 {
    if i >= U256::from(32) {
        return U256::zero();
    }
    U256::from(x.byte(31 - i.low_u64() as usize))
}

/// SHL: value << shift
pub fn shl(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) {
        return U256::zero();
    }
    value << shift.low_u64() as usize
}

/// SHR: logical value >> shift
pub fn shr(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) {
        return U256::zero();
    }
    value >> shift.low_u64() as usize
}

/// SAR: arithmetic value >> shift (sign-preserving)
pub fn sar(shift: U256, value: U256) -> U256 {
    let negative = is_negative(&value);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let s = shift.low_u64() as usize;
    if s == 0 {
        return value;
    }
    let shifted = value >> s;
    if negative {
        shifted | (U256::MAX << (256 - s))
    } else {
        shifted
    }
}

/// Signed less than (two's complement)
pub fn slt(a: &U256, b: &U256) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

/// Signed greater than (two's complement)
pub fn sgt(a: &U256, b: &U256) -> bool {
    slt(b, a)
}
