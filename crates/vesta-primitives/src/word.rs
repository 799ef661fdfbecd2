//! Storage value encoding
//!
//! Storage cells hold byte strings that are logically 256-bit integers.
//! Values are kept in their minimal big-endian form, with zero written as a
//! single `0x00` byte. Any all-zero string reads back as zero.

use primitive_types::U256;

/// Canonical encoding of the zero value
pub const ZERO_VALUE: [u8; 1] = [0u8];

/// Encode a word as its minimal big-endian byte string
pub fn encode_word(value: U256) -> Vec<u8> {
    if value.is_zero() {
        return ZERO_VALUE.to_vec();
    }
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let start = (value.leading_zeros() / 8) as usize;
    buf[start..].to_vec()
}

/// Decode a stored byte string into a word
///
/// Strings longer than 32 bytes keep their trailing 32 bytes.
pub fn decode_word(bytes: &[u8]) -> U256 {
    if bytes.len() > 32 {
        return U256::from_big_endian(&bytes[bytes.len() - 32..]);
    }
    U256::from_big_endian(bytes)
}

/// Whether a stored value denotes zero (absent)
pub fn is_zero_value(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}
