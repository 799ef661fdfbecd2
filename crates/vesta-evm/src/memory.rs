//! Frame memory

use crate::error::Fault;
use crate::stack::to_usize;
use primitive_types::U256;

/// Byte-addressable memory that grows in 32-byte words
#[derive(Clone, Debug, Default)]
pub struct Memory {
    data: Vec<u8>,
}

/// Resolve an (offset, size) operand pair to a byte range.
///
/// A zero size never touches memory, whatever the offset. Returns `None`
/// in that case.
pub fn resolve_range(offset: &U256, size: &U256) -> Result<Option<(usize, usize)>, Fault> {
    if size.is_zero() {
        return Ok(None);
    }
    let offset = to_usize(offset).ok_or(Fault::OutOfBoundsMemoryAccess)?;
    let size = to_usize(size).ok_or(Fault::OutOfBoundsMemoryAccess)?;
    offset
        .checked_add(size)
        .ok_or(Fault::OutOfBoundsMemoryAccess)?;
    Ok(Some((offset, size)))
}

impl Memory {
    /// Create new empty memory
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Get current memory size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Size memory would have after touching `offset..offset + size`
    pub fn size_after(&self, offset: usize, size: usize) -> usize {
        if size == 0 {
            return self.data.len();
        }
        let end = offset.saturating_add(size);
        self.data.len().max(end.div_ceil(32).saturating_mul(32))
    }

    /// Ensure memory covers `offset..offset + size`, word aligned
    pub fn expand(&mut self, offset: usize, size: usize) {
        let new_size = self.size_after(offset, size);
        if new_size > self.data.len() {
            self.data.resize(new_size, 0);
        }
    }

    /// Load a 32-byte word from memory
    pub fn load(&self, offset: usize) -> U256 {
        U256::from_big_endian(&self.load_slice(offset, 32))
    }

    /// Store a 32-byte word to memory
    pub fn store(&mut self, offset: usize, value: &U256) {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.store_slice(offset, &word);
    }

    /// Store a single byte to memory
    pub fn store8(&mut self, offset: usize, value: u8) {
        self.expand(offset, 1);
        self.data[offset] = value;
    }

    /// Load a byte slice from memory, zero-filled past the end
    pub fn load_slice(&self, offset: usize, size: usize) -> Vec<u8> {
        let mut result = vec![0u8; size];
        if offset < self.data.len() {
            let end = offset.saturating_add(size).min(self.data.len());
            result[..end - offset].copy_from_slice(&self.data[offset..end]);
        }
        result
    }

    /// Store a byte slice to memory
    pub fn store_slice(&mut self, offset: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.expand(offset, data.len());
        self.data[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Copy `size` bytes of `source` starting at `source_offset` into memory,
    /// zero-filling whatever lies past the end of `source`
    pub fn copy_from(&mut self, offset: usize, source: &[u8], source_offset: usize, size: usize) {
        if size == 0 {
            return;
        }
        self.expand(offset, size);
        let dest = &mut self.data[offset..offset + size];
        dest.fill(0);
        if source_offset < source.len() {
            let end = source_offset.saturating_add(size).min(source.len());
            dest[..end - source_offset].copy_from_slice(&source[source_offset..end]);
        }
    }

    /// Get raw data slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
