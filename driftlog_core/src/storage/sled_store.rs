//! Sled-backed sample store.
//!
//! Layout: one sled tree per entity key; each record is stored under a
//! monotonically generated 8-byte big-endian id so that batches never
//! overwrite each other.

use std::path::Path;

use super::{SampleStore, StoreError};

pub struct SledSampleStore {
    db: sled::Db,
}

impl SledSampleStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Unavailable(format!("Failed to open sled DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Create a store that is deleted when dropped
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Unavailable(format!("Failed to open temp DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Force buffered writes to disk
    pub fn flush(&self) -> Result<usize, StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Write(format!("Flush failed: {}", e)))
    }

    fn has_tree(&self, key: &[u8]) -> bool {
        self.db.tree_names().iter().any(|name| &name[..] == key)
    }
}

impl SampleStore for SledSampleStore {
    fn append_batch(&self, key: &[u8], records: &[Vec<u8>]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let tree = self
            .db
            .open_tree(key)
            .map_err(|e| StoreError::Unavailable(format!("Open tree failed: {}", e)))?;

        let mut batch = sled::Batch::default();
        for record in records {
            let id = self
                .db
                .generate_id()
                .map_err(|e| StoreError::Write(format!("Id generation failed: {}", e)))?;
            batch.insert(id.to_be_bytes().to_vec(), record.as_slice());
        }

        tree.apply_batch(batch)
            .map_err(|e| StoreError::Write(format!("Batch apply failed: {}", e)))
    }

    fn read_all(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        // Opening a tree creates it; unknown entities must stay unknown.
        if !self.has_tree(key) {
            return Ok(Vec::new());
        }

        let tree = self
            .db
            .open_tree(key)
            .map_err(|e| StoreError::Unavailable(format!("Open tree failed: {}", e)))?;

        tree.iter()
            .values()
            .map(|value| {
                value
                    .map(|v| v.to_vec())
                    .map_err(|e| StoreError::Read(format!("Iteration failed: {}", e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_accumulates_across_batches() {
        let store = SledSampleStore::temporary().unwrap();
        let key = b"user.a.location";

        store.append_batch(key, &[b"one".to_vec(), b"two".to_vec()]).unwrap();
        store.append_batch(key, &[b"two".to_vec()]).unwrap();

        let mut records = store.read_all(key).unwrap();
        records.sort();
        assert_eq!(records, vec![b"one".to_vec(), b"two".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_keys_are_isolated() {
        let store = SledSampleStore::temporary().unwrap();
        store.append_batch(b"user.a.location", &[b"a".to_vec()]).unwrap();
        store.append_batch(b"user.ab.location", &[b"ab".to_vec()]).unwrap();

        assert_eq!(store.read_all(b"user.a.location").unwrap(), vec![b"a".to_vec()]);
        assert_eq!(store.read_all(b"user.ab.location").unwrap(), vec![b"ab".to_vec()]);
    }

    #[test]
    fn test_unknown_key_reads_empty_without_creating_tree() {
        let store = SledSampleStore::temporary().unwrap();
        assert!(store.read_all(b"user.ghost.location").unwrap().is_empty());
        assert!(!store.has_tree(b"user.ghost.location"));
    }
}
