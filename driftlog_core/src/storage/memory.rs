//! In-memory sample store for tests and embedding.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{SampleStore, StoreError};

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Unavailable(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
pub struct MemorySampleStore {
    records: RwLock<HashMap<Vec<u8>, Vec<Vec<u8>>>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads stored under `key`.
    pub fn len(&self, key: &[u8]) -> usize {
        self.records
            .read()
            .map(|records| records.get(key).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl SampleStore for MemorySampleStore {
    fn append_batch(&self, key: &[u8], records: &[Vec<u8>]) -> Result<(), StoreError> {
        let mut guard = self.records.write().map_err(|_| lock_err("append_batch"))?;
        guard
            .entry(key.to_vec())
            .or_default()
            .extend(records.iter().cloned());
        Ok(())
    }

    fn read_all(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        let guard = self.records.read().map_err(|_| lock_err("read_all"))?;
        Ok(guard.get(key).cloned().unwrap_or_default())
    }
}
