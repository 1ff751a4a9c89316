//! driftlog Core - concurrent random-walk generation and windowed retrieval
//!
//! This library covers three concerns:
//! 1. **Lifecycle**: one generator task per entity, all under a single
//!    cancellable session with a wall-clock deadline ([`SessionSupervisor`])
//! 2. **Ingestion**: buffered samples flushed to a [`SampleStore`] on a
//!    size-or-time trigger, lossy at most once ([`Generator`])
//! 3. **Retrieval**: sort-on-read and percentage windowing ([`Retriever`])

pub mod config;
pub mod error;
pub mod generator;
pub mod retriever;
pub mod sample;
pub mod storage;
pub mod supervisor;

// Re-export key types for convenience
pub use config::SimulationConfig;
pub use error::{DriftError, Result};
pub use generator::{Generator, GeneratorStats};
pub use retriever::Retriever;
pub use sample::{entity_key, Sample};
pub use storage::{MemorySampleStore, SampleStore, SledSampleStore, StoreError};
pub use supervisor::{SessionSupervisor, StartReport, StopReason, StopReport};
