//! Key-value store abstraction
//!
//! The trie and the code store persist through [`KeyValueStore`]. Two
//! backends are provided: [`MemoryDb`] for tests and ephemeral runs, and the
//! RocksDB-backed [`crate::Database`].

use crate::error::{StateError, StateResult};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Column family names
pub mod cf {
    /// Content-addressed trie nodes
    pub const TRIE: &str = "trie";
    /// Contract code by hash
    pub const CODE: &str = "code";
    /// Metadata (head root, schema)
    pub const META: &str = "meta";
}

/// All column family names
pub const ALL_CFS: &[&str] = &[cf::TRIE, cf::CODE, cf::META];

/// Blocking key-value store partitioned into column families
pub trait KeyValueStore: Send + Sync {
    /// Get a value from a column family
    fn get(&self, cf_name: &str, key: &[u8]) -> StateResult<Option<Vec<u8>>>;

    /// Put a value to a column family
    fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> StateResult<()>;

    /// Delete a value from a column family
    fn delete(&self, cf_name: &str, key: &[u8]) -> StateResult<()>;

    /// Apply a batch atomically
    fn write_batch(&self, batch: WriteBatch) -> StateResult<()>;
}

/// Batch operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite
    Put {
        /// Column family
        cf_name: String,
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Remove
    Delete {
        /// Column family
        cf_name: String,
        /// Key
        key: Vec<u8>,
    },
}

/// Ordered list of writes applied together
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    operations: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create a new write batch
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Add a put operation
    pub fn put(&mut self, cf_name: &str, key: &[u8], value: &[u8]) {
        self.operations.push(BatchOp::Put {
            cf_name: cf_name.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Add a delete operation
    pub fn delete(&mut self, cf_name: &str, key: &[u8]) {
        self.operations.push(BatchOp::Delete {
            cf_name: cf_name.to_string(),
            key: key.to_vec(),
        });
    }

    /// Get number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Consume the batch
    pub fn into_operations(self) -> Vec<BatchOp> {
        self.operations
    }
}

type Column = HashMap<Vec<u8>, Vec<u8>>;

/// In-memory store with the same column families as the RocksDB backend
#[derive(Debug)]
pub struct MemoryDb {
    columns: RwLock<HashMap<String, Column>>,
}

impl MemoryDb {
    /// Create an empty store
    pub fn new() -> Self {
        let columns = ALL_CFS
            .iter()
            .map(|name| (name.to_string(), Column::new()))
            .collect();
        Self {
            columns: RwLock::new(columns),
        }
    }

    /// Number of keys in a column family
    pub fn len(&self, cf_name: &str) -> usize {
        self.columns.read().get(cf_name).map_or(0, |c| c.len())
    }

    /// Whether a column family holds no keys
    pub fn is_empty(&self, cf_name: &str) -> bool {
        self.len(cf_name) == 0
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

fn column_mut<'a>(
    columns: &'a mut HashMap<String, Column>,
    cf_name: &str,
) -> StateResult<&'a mut Column> {
    columns
        .get_mut(cf_name)
        .ok_or_else(|| StateError::InvalidColumnFamily(cf_name.to_string()))
}

impl KeyValueStore for MemoryDb {
    fn get(&self, cf_name: &str, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        let columns = self.columns.read();
        let column = columns
            .get(cf_name)
            .ok_or_else(|| StateError::InvalidColumnFamily(cf_name.to_string()))?;
        Ok(column.get(key).cloned())
    }

    fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> StateResult<()> {
        let mut columns = self.columns.write();
        column_mut(&mut columns, cf_name)?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> StateResult<()> {
        let mut columns = self.columns.write();
        column_mut(&mut columns, cf_name)?.remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StateResult<()> {
        let mut columns = self.columns.write();
        // Validate first so a bad column leaves the store untouched
        for op in &batch.operations {
            let cf_name = match op {
                BatchOp::Put { cf_name, .. } | BatchOp::Delete { cf_name, .. } => cf_name,
            };
            column_mut(&mut columns, cf_name)?;
        }
        for op in batch.operations {
            match op {
                BatchOp::Put { cf_name, key, value } => {
                    column_mut(&mut columns, &cf_name)?.insert(key, value);
                }
                BatchOp::Delete { cf_name, key } => {
                    column_mut(&mut columns, &cf_name)?.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_put_get_delete() {
        let db = MemoryDb::new();
        db.put(cf::CODE, b"k", b"v").unwrap();
        assert_eq!(db.get(cf::CODE, b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(db.get(cf::TRIE, b"k").unwrap(), None);

        db.delete(cf::CODE, b"k").unwrap();
        assert!(db.is_empty(cf::CODE));
    }

    #[test]
    fn test_memory_unknown_column() {
        let db = MemoryDb::new();
        assert!(matches!(
            db.get("bogus", b"k"),
            Err(StateError::InvalidColumnFamily(_))
        ));
    }

    #[test]
    fn test_memory_batch_is_atomic() {
        let db = MemoryDb::new();
        let mut batch = WriteBatch::new();
        batch.put(cf::TRIE, b"a", b"1");
        batch.put("bogus", b"b", b"2");
        assert!(db.write_batch(batch).is_err());
        assert!(db.is_empty(cf::TRIE));

        let mut batch = WriteBatch::new();
        batch.put(cf::TRIE, b"a", b"1");
        batch.put(cf::TRIE, b"b", b"2");
        batch.delete(cf::TRIE, b"a");
        assert_eq!(batch.len(), 3);
        db.write_batch(batch).unwrap();
        assert_eq!(db.len(cf::TRIE), 1);
        assert_eq!(db.get(cf::TRIE, b"b").unwrap(), Some(b"2".to_vec()));
    }
}
