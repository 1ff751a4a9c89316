//! Persistence seam: an ordered append/read store keyed by entity.
//!
//! The core only ever appends batches of opaque payloads under a key and
//! reads every payload back. Ordering at rest is not relied upon; the
//! retriever sorts by decoded timestamp.

mod memory;
mod sled_store;

pub use memory::MemorySampleStore;
pub use sled_store::SledSampleStore;

use thiserror::Error;

/// Failures reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("read failed: {0}")]
    Read(String),
}

/// Append/read persistence keyed by entity.
///
/// Implementations must be safe for concurrent use by many generators and
/// readers at once; the core adds no locking of its own around store calls.
pub trait SampleStore: Send + Sync {
    /// Appends `records` under `key`. Repeated calls with the same key accumulate.
    fn append_batch(&self, key: &[u8], records: &[Vec<u8>]) -> Result<(), StoreError>;

    /// Returns every payload ever appended under `key`, in any order.
    fn read_all(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, StoreError>;
}
