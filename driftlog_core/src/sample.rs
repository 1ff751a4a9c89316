//! The recorded unit: one timestamped 2D displacement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One recorded displacement.
///
/// Serialized as `{"dx": .., "dy": .., "ts": "<RFC-3339>"}` both in the
/// store and in query responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "dx")]
    pub delta_x: f64,

    #[serde(rename = "dy")]
    pub delta_y: f64,

    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(delta_x: f64, delta_y: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            delta_x,
            delta_y,
            timestamp,
        }
    }

    /// Length of the displacement vector.
    pub fn magnitude(&self) -> f64 {
        self.delta_x.hypot(self.delta_y)
    }

    /// Encodes the sample as a store payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a store payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Store key holding every sample of one entity.
pub fn entity_key(entity_id: &str) -> Vec<u8> {
    format!("user.{entity_id}.location").into_bytes()
}
