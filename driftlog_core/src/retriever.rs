//! Windowed reads of an entity's recorded history.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::sample::{entity_key, Sample};
use crate::storage::SampleStore;

/// Clamps a fraction into `[0, 1]`, mapping NaN to `fallback`.
fn unit_fraction(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Half-open index range `[start, end)` selected by a fraction window over `n` items.
///
/// Inputs are clamped rather than rejected: out-of-range fractions are
/// pulled into `[0, 1]` and a `min` above `max` collapses onto `max`.
pub fn window_bounds(n: usize, min_fraction: f64, max_fraction: f64) -> (usize, usize) {
    let max_fraction = unit_fraction(max_fraction, 1.0);
    let min_fraction = unit_fraction(min_fraction, 0.0).min(max_fraction);

    let end = ((max_fraction * n as f64).floor() as usize).min(n);
    let start = ((min_fraction * n as f64).floor() as usize).min(end);
    (start, end)
}

/// Reads, repairs ordering and windows an entity's samples.
///
/// Bypasses the supervisor entirely; it only needs the store.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn SampleStore>,
}

impl Retriever {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }

    /// Returns the `[min_fraction, max_fraction)` slice of the entity's
    /// samples in ascending timestamp order.
    ///
    /// Undecodable records are skipped. An entity with no samples yields an
    /// empty vector, not an error; only a store failure is an error.
    pub fn fetch(&self, entity_id: &str, min_fraction: f64, max_fraction: f64) -> Result<Vec<Sample>> {
        let raw = self.store.read_all(&entity_key(entity_id))?;

        let mut samples: Vec<Sample> = raw
            .iter()
            .filter_map(|bytes| match Sample::decode(bytes) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!(
                        entity = %entity_id,
                        error = %e,
                        data = %String::from_utf8_lossy(bytes),
                        "Skipping corrupted record"
                    );
                    None
                }
            })
            .collect();

        if samples.is_empty() {
            return Ok(samples);
        }

        // Flush order is not chronological; stable sort keeps ties in read order.
        samples.sort_by_key(|s| s.timestamp);

        let (start, end) = window_bounds(samples.len(), min_fraction, max_fraction);
        debug!(entity = %entity_id, total = samples.len(), start, end, "Windowed fetch");

        samples.truncate(end);
        Ok(samples.split_off(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriftError;
    use crate::storage::{MemorySampleStore, StoreError};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    struct DownStore;

    impl SampleStore for DownStore {
        fn append_batch(&self, _key: &[u8], _records: &[Vec<u8>]) -> std::result::Result<(), StoreError> {
            Err(StoreError::Unavailable("not initialized".into()))
        }

        fn read_all(&self, _key: &[u8]) -> std::result::Result<Vec<Vec<u8>>, StoreError> {
            Err(StoreError::Unavailable("not initialized".into()))
        }
    }

    fn t(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(i)
    }

    /// Stores samples with timestamps t0..t(n-1) in a scrambled order.
    fn seeded_store(entity: &str, n: i64) -> Arc<MemorySampleStore> {
        let store = Arc::new(MemorySampleStore::new());
        let mut order: Vec<i64> = (0..n).collect();
        // Deterministic scramble: evens descending then odds ascending
        order.sort_by_key(|i| if i % 2 == 0 { (0, -i) } else { (1, *i) });
        let records: Vec<Vec<u8>> = order
            .into_iter()
            .map(|i| Sample::new(i as f64, -(i as f64), t(i)).encode().unwrap())
            .collect();
        store.append_batch(&entity_key(entity), &records).unwrap();
        store
    }

    #[test]
    fn test_window_from_twenty_to_fifty_percent() {
        let retriever = Retriever::new(seeded_store("u1", 10));
        let window = retriever.fetch("u1", 0.2, 0.5).unwrap();

        let stamps: Vec<_> = window.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![t(2), t(3), t(4)]);
    }

    #[test]
    fn test_full_window_is_sorted() {
        let retriever = Retriever::new(seeded_store("u1", 25));
        let all = retriever.fetch("u1", 0.0, 1.0).unwrap();

        assert_eq!(all.len(), 25);
        assert_eq!(all.first().unwrap().timestamp, t(0));
        assert_eq!(all.last().unwrap().timestamp, t(24));
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_degenerate_window_is_empty() {
        let retriever = Retriever::new(seeded_store("u1", 10));
        assert!(retriever.fetch("u1", 0.5, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_entity_is_empty_not_error() {
        let retriever = Retriever::new(Arc::new(MemorySampleStore::new()));
        assert!(retriever.fetch("nobody", 0.0, 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_records_are_skipped() {
        let store = seeded_store("u1", 4);
        store
            .append_batch(&entity_key("u1"), &[b"{garbage".to_vec(), b"".to_vec()])
            .unwrap();

        let retriever = Retriever::new(store);
        assert_eq!(retriever.fetch("u1", 0.0, 1.0).unwrap().len(), 4);
    }

    #[test]
    fn test_store_unavailable_is_surfaced() {
        let retriever = Retriever::new(Arc::new(DownStore));
        let err = retriever.fetch("u1", 0.0, 1.0).unwrap_err();
        assert!(matches!(err, DriftError::StoreUnavailable(_)));
    }

    #[test]
    fn test_out_of_range_fractions_are_clamped() {
        assert_eq!(window_bounds(10, -3.0, 7.0), (0, 10));
        assert_eq!(window_bounds(10, 0.8, 0.3), (3, 3));
        assert_eq!(window_bounds(10, f64::NAN, f64::NAN), (0, 10));
        assert_eq!(window_bounds(10, f64::NEG_INFINITY, f64::INFINITY), (0, 10));
        assert_eq!(window_bounds(0, 0.0, 1.0), (0, 0));
    }

    proptest! {
        #[test]
        fn prop_window_size_matches_floor_difference(
            n in 0usize..500,
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let (start, end) = window_bounds(n, lo, hi);

            let expected = (hi * n as f64).floor() as usize - (lo * n as f64).floor() as usize;
            prop_assert!(start <= end && end <= n);
            prop_assert_eq!(end - start, expected);
        }

        #[test]
        fn prop_fetch_is_sorted_and_sized(n in 1i64..60, a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let retriever = Retriever::new(seeded_store("p", n));
            let window = retriever.fetch("p", lo, hi).unwrap();

            let (start, end) = window_bounds(n as usize, lo, hi);
            prop_assert_eq!(window.len(), end - start);
            prop_assert!(window.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
            if let Some(first) = window.first() {
                prop_assert_eq!(first.timestamp, t(start as i64));
            }
        }
    }
}
