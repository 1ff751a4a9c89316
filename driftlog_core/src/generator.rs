//! The per-entity generator task.
//!
//! One generator runs per simulated entity. Its loop checks three
//! conditions in order on every pass:
//!
//! 1. **Cancelled** - flush whatever is buffered and exit.
//! 2. **Flush due** - the flush interval elapsed; write the buffer out.
//! 3. **Sample due** - draw one random step, append it, and flush early
//!    if the buffer reached capacity (which also restarts the flush clock).
//!
//! When nothing is due the task sleeps until the nearest boundary (or
//! until cancellation), so an idle generator costs nothing.
//!
//! Flushes are fire-and-forget: a failed write is logged and its batch is
//! dropped. Generation never waits on, retries or reports a flush.

use std::f64::consts::TAU;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use driftlog_env::DriftContext;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::error::DriftError;
use crate::sample::{entity_key, Sample};
use crate::storage::SampleStore;

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Buffer reached `batch_capacity`
    Size,
    /// `flush_interval` elapsed
    Timer,
    /// Generator is shutting down
    Final,
}

/// Counters reported when a generator exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Samples drawn
    pub generated: u64,
    /// Samples handed to a successful `append_batch`
    pub persisted: u64,
    /// Samples lost to encoding or write failures
    pub dropped: u64,
    /// Flush attempts with a non-empty buffer
    pub flushes: u64,
}

/// Draws one random displacement: uniform direction in `[0, 2π)` and
/// uniform magnitude in `[0, max_magnitude]`.
pub fn random_step<R: Rng>(rng: &mut R, max_magnitude: f64) -> (f64, f64) {
    let angle = rng.gen::<f64>() * TAU;
    let magnitude = if max_magnitude > 0.0 {
        rng.gen_range(0.0..=max_magnitude)
    } else {
        0.0
    };
    (magnitude * angle.cos(), magnitude * angle.sin())
}

/// Random-walk generator for a single entity.
pub struct Generator<Ctx: DriftContext> {
    entity_id: String,
    key: Vec<u8>,
    context: Arc<Ctx>,
    store: Arc<dyn SampleStore>,
    config: SimulationConfig,
    rng: ChaCha8Rng,
    buffer: Vec<Sample>,
    stats: GeneratorStats,
}

impl<Ctx: DriftContext> Generator<Ctx> {
    pub fn new(
        entity_id: impl Into<String>,
        context: Arc<Ctx>,
        store: Arc<dyn SampleStore>,
        config: SimulationConfig,
        rng: ChaCha8Rng,
    ) -> Self {
        let entity_id = entity_id.into();
        let key = entity_key(&entity_id);
        let buffer = Vec::with_capacity(config.batch_capacity);
        Self {
            entity_id,
            key,
            context,
            store,
            config,
            rng,
            buffer,
            stats: GeneratorStats::default(),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Runs until `cancel` fires, then performs a final flush.
    pub async fn run(mut self, cancel: CancellationToken) -> GeneratorStats {
        info!(entity = %self.entity_id, "Starting simulation");

        let sample_interval = self.config.sample_interval;
        let flush_interval = self.config.flush_interval;
        let mut next_sample = self.context.now();
        let mut next_flush = next_sample + flush_interval;

        loop {
            if cancel.is_cancelled() {
                self.flush(FlushTrigger::Final);
                break;
            }

            let now = self.context.now();

            if now >= next_flush {
                self.flush(FlushTrigger::Timer);
                next_flush = now + flush_interval;
                continue;
            }

            if now >= next_sample {
                self.push_sample();
                next_sample += sample_interval;
                if next_sample <= now {
                    // Fell behind (slow flush); resume cadence instead of bursting.
                    next_sample = now + sample_interval;
                }
                if self.buffer.len() >= self.config.batch_capacity {
                    self.flush(FlushTrigger::Size);
                    next_flush = self.context.now() + flush_interval;
                }
                continue;
            }

            let wake = next_sample.min(next_flush) - now;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = self.context.sleep(wake) => {}
            }
        }

        info!(
            entity = %self.entity_id,
            generated = self.stats.generated,
            persisted = self.stats.persisted,
            dropped = self.stats.dropped,
            "Stopping simulation"
        );
        self.stats
    }

    fn push_sample(&mut self) {
        let (delta_x, delta_y) = random_step(&mut self.rng, self.config.max_step_magnitude);
        let timestamp = DateTime::<Utc>::from(self.context.system_time());
        self.buffer.push(Sample::new(delta_x, delta_y, timestamp));
        self.stats.generated += 1;
    }

    /// Writes the buffer out and replaces it with an empty one.
    fn flush(&mut self, trigger: FlushTrigger) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.config.batch_capacity),
        );
        self.stats.flushes += 1;

        let mut records = Vec::with_capacity(batch.len());
        for sample in &batch {
            match sample.encode() {
                Ok(bytes) => records.push(bytes),
                Err(e) => {
                    warn!(entity = %self.entity_id, error = %e, "Skipping unencodable sample");
                    self.stats.dropped += 1;
                }
            }
        }

        match self.store.append_batch(&self.key, &records) {
            Ok(()) => {
                self.stats.persisted += records.len() as u64;
                debug!(entity = %self.entity_id, ?trigger, count = records.len(), "Flushed batch");
            }
            Err(e) => {
                let err = DriftError::from(e);
                self.stats.dropped += records.len() as u64;
                warn!(
                    entity = %self.entity_id,
                    ?trigger,
                    count = records.len(),
                    error = %err,
                    "Flush failed, batch discarded"
                );
            }
        }
    }
}
