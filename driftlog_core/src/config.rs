//! Simulation tuning knobs.

use crate::error::{DriftError, Result};
use std::time::Duration;

/// Configuration shared by the supervisor and every generator it spawns.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Samples buffered before a size-triggered flush (default: 100)
    pub batch_capacity: usize,

    /// Longest time a non-empty buffer waits before a timed flush (default: 100ms)
    pub flush_interval: Duration,

    /// Cadence at which one sample is generated (default: 1ms)
    pub sample_interval: Duration,

    /// Upper bound on a single step's displacement (default: 0.004)
    pub max_step_magnitude: f64,

    /// Wall-clock bound of one session (default: 30s)
    pub session_duration: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            batch_capacity: 100,
            flush_interval: Duration::from_millis(100),
            sample_interval: Duration::from_millis(1),
            max_step_magnitude: 0.004,
            session_duration: Duration::from_secs(30),
        }
    }
}

impl SimulationConfig {
    /// Rejects settings that would stall or spin a generator.
    pub fn validate(&self) -> Result<()> {
        if self.batch_capacity == 0 {
            return Err(DriftError::validation("batch_capacity must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(DriftError::validation("flush_interval must be non-zero"));
        }
        if self.sample_interval.is_zero() {
            return Err(DriftError::validation("sample_interval must be non-zero"));
        }
        if !self.max_step_magnitude.is_finite() || self.max_step_magnitude < 0.0 {
            return Err(DriftError::validation(format!(
                "max_step_magnitude must be a finite non-negative number, got {}",
                self.max_step_magnitude
            )));
        }
        if self.session_duration.is_zero() {
            return Err(DriftError::validation("session_duration must be non-zero"));
        }
        Ok(())
    }
}
