//! Production implementation of DriftContext using Tokio.

use crate::DriftContext;
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Odd 64-bit constant used to spread the master seed before mixing.
const SEED_SPREAD: u64 = 0x517c_c1b7_2722_0a95;

/// Context backed by Tokio and either OS entropy or a master seed.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Master seed; `None` draws every RNG from OS entropy
    seed: Option<u64>,
}

impl TokioContext {
    /// Creates an unseeded context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            seed: None,
        }
    }

    /// Creates a context whose derived RNGs are reproducible.
    ///
    /// A seed of 0 is treated as "unseeded".
    pub fn seeded(seed: u64) -> Self {
        Self {
            start: Instant::now(),
            seed: (seed != 0).then_some(seed),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriftContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::info_span!("task", name = %name);
        tokio::spawn(future.instrument(span))
    }

    fn derive_rng(&self, seed_extension: u64) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => {
                let combined = seed.wrapping_mul(SEED_SPREAD) ^ seed_extension;
                ChaCha8Rng::seed_from_u64(combined)
            }
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn seed(&self) -> u64 {
        self.seed.unwrap_or(0)
    }
}
