//! Core environment context trait for driftlog generators.

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// The central interface for environment interaction.
///
/// Generators and the session supervisor never touch the clock, the
/// scheduler or an entropy source directly; they go through this trait so
/// that a run can be made reproducible by swapping the context.
///
/// # Implementations
///
/// - **Production**: `TokioContext::new()` - wraps `tokio::time`, OS entropy
/// - **Reproducible**: `TokioContext::seeded(seed)` - same runtime, seeded RNGs
#[async_trait]
pub trait DriftContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used by the generator scheduler to compute its next wake-up.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used to stamp samples.
    fn system_time(&self) -> SystemTime;

    /// Suspends the calling task for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task.
    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns a fresh random source for one generator.
    ///
    /// Two calls must never hand out identically seeded sources for
    /// different extensions, otherwise concurrently started entities
    /// would walk correlated paths.
    ///
    /// # Arguments
    /// * `seed_extension` - A value unique to the consumer (session + slot)
    fn derive_rng(&self, seed_extension: u64) -> ChaCha8Rng;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// Unseeded contexts return 0.
    fn seed(&self) -> u64;
}
