//! RocksDB backend

use crate::error::{StateError, StateResult};
use crate::kv::{BatchOp, KeyValueStore, WriteBatch, ALL_CFS};
use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
    WriteBatch as RocksBatch,
};
use std::path::Path;
use std::sync::Arc;

type RocksDB = DBWithThreadMode<MultiThreaded>;

const MAX_OPEN_FILES: i32 = 512;
const WRITE_BUFFER_SIZE: usize = 64 * 1024 * 1024; // 64MB
const MAX_WRITE_BUFFER_NUMBER: i32 = 3;

/// RocksDB wrapper with column family support.
///
/// Clones share the same handle. The handle is released by [`Database::close`]
/// or when the last clone is dropped; any operation after close fails with
/// [`StateError::NotOpen`].
pub struct Database {
    db: Arc<RwLock<Option<RocksDB>>>,
    path: String,
}

impl Database {
    /// Create a new database instance (not yet opened)
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            db: Arc::new(RwLock::new(None)),
            path: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// Create and open in one step
    pub fn open_at(path: impl AsRef<Path>) -> StateResult<Self> {
        let db = Self::new(path);
        db.open()?;
        Ok(db)
    }

    /// Open the database, creating it and its column families if missing
    pub fn open(&self) -> StateResult<()> {
        let mut db_guard = self.db.write();
        if db_guard.is_some() {
            return Err(StateError::AlreadyOpen);
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(MAX_OPEN_FILES);
        opts.set_write_buffer_size(WRITE_BUFFER_SIZE);
        opts.set_max_write_buffer_number(MAX_WRITE_BUFFER_NUMBER);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = RocksDB::open_cf_descriptors(&opts, &self.path, cf_descriptors)?;
        *db_guard = Some(db);
        tracing::debug!(path = %self.path, "database opened");
        Ok(())
    }

    /// Close the database, releasing the handle for every clone
    pub fn close(&self) {
        let mut db_guard = self.db.write();
        if db_guard.take().is_some() {
            tracing::debug!(path = %self.path, "database closed");
        }
    }

    /// Get database path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get column family handle
    fn get_cf<'a>(&self, db: &'a RocksDB, name: &str) -> StateResult<Arc<BoundColumnFamily<'a>>> {
        db.cf_handle(name)
            .ok_or_else(|| StateError::InvalidColumnFamily(name.to_string()))
    }
}

impl KeyValueStore for Database {
    fn get(&self, cf_name: &str, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StateError::NotOpen)?;
        let cf = self.get_cf(db, cf_name)?;
        Ok(db.get_cf(&cf, key)?)
    }

    fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> StateResult<()> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StateError::NotOpen)?;
        let cf = self.get_cf(db, cf_name)?;
        db.put_cf(&cf, key, value)?;
        Ok(())
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> StateResult<()> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StateError::NotOpen)?;
        let cf = self.get_cf(db, cf_name)?;
        db.delete_cf(&cf, key)?;
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StateResult<()> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StateError::NotOpen)?;

        let mut rocks_batch = RocksBatch::default();
        for op in batch.into_operations() {
            match op {
                BatchOp::Put { cf_name, key, value } => {
                    let cf = self.get_cf(db, &cf_name)?;
                    rocks_batch.put_cf(&cf, &key, &value);
                }
                BatchOp::Delete { cf_name, key } => {
                    let cf = self.get_cf(db, &cf_name)?;
                    rocks_batch.delete_cf(&cf, &key);
                }
            }
        }

        db.write(rocks_batch)?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            path: self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::cf;

    #[test]
    fn test_open_close() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path());

        assert!(matches!(db.get(cf::META, b"k"), Err(StateError::NotOpen)));
        db.open().unwrap();
        assert!(matches!(db.open(), Err(StateError::AlreadyOpen)));
        db.put(cf::META, b"k", b"v").unwrap();
        db.close();
        assert!(matches!(db.get(cf::META, b"k"), Err(StateError::NotOpen)));

        db.open().unwrap();
        assert_eq!(db.get(cf::META, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path()).unwrap();

        db.put(cf::TRIE, b"key1", b"value1").unwrap();
        assert_eq!(db.get(cf::TRIE, b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(db.get(cf::TRIE, b"missing").unwrap(), None);

        db.delete(cf::TRIE, b"key1").unwrap();
        assert!(db.get(cf::TRIE, b"key1").unwrap().is_none());
    }

    #[test]
    fn test_write_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path()).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(cf::TRIE, b"n1", b"data1");
        batch.put(cf::CODE, b"c1", b"code");
        batch.delete(cf::TRIE, b"n1");
        db.write_batch(batch).unwrap();

        assert_eq!(db.get(cf::TRIE, b"n1").unwrap(), None);
        assert_eq!(db.get(cf::CODE, b"c1").unwrap(), Some(b"code".to_vec()));
    }

    #[test]
    fn test_not_open_error() {
        let db = Database::new("/tmp/vesta_not_opened");
        assert!(matches!(db.get(cf::TRIE, b"key"), Err(StateError::NotOpen)));
        assert!(matches!(db.put(cf::TRIE, b"k", b"v"), Err(StateError::NotOpen)));
        assert!(matches!(
            db.write_batch(WriteBatch::new()),
            Err(StateError::NotOpen)
        ));
    }

    #[test]
    fn test_close_applies_to_clones() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path()).unwrap();
        let shared = db.clone();

        db.close();
        assert!(matches!(shared.get(cf::CODE, b"k"), Err(StateError::NotOpen)));
    }

    #[test]
    fn test_already_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path()).unwrap();
        assert!(matches!(db.open(), Err(StateError::AlreadyOpen)));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path()).unwrap();
        db.put(cf::META, b"head", b"root").unwrap();
        db.close();

        db.open().unwrap();
        assert_eq!(db.get(cf::META, b"head").unwrap(), Some(b"root".to_vec()));
    }
}
