//! Property-Based Tests for the Metric Store
//!
//! # Test Properties
//!
//! 1. **Bounded Series**: after N > C records, len == C and the retained
//!    points are exactly the last C in call order
//! 2. **Window Correctness**: a window query returns exactly the points whose
//!    timestamp is at or after `now - window`

#![cfg(test)]

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use super::store::MetricStore;
use crate::adapters::Notifier;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_series_keeps_last_capacity_points(
        capacity in 1usize..64,
        values in prop::collection::vec(-1.0e6f64..1.0e6, 0..256),
    ) {
        let store = MetricStore::new(capacity, Notifier::disabled());
        for v in &values {
            store.record("cpu_usage", *v).unwrap();
        }

        let expected: Vec<f64> = values
            .iter()
            .skip(values.len().saturating_sub(capacity))
            .copied()
            .collect();
        let retained: Vec<f64> = store
            .query_recent("cpu_usage", Duration::from_secs(3600))
            .iter()
            .map(|p| p.value)
            .collect();

        prop_assert_eq!(store.len("cpu_usage"), Some(values.len().min(capacity)));
        prop_assert_eq!(retained, expected);
    }

    #[test]
    fn prop_window_returns_exactly_recent_points(
        offsets in prop::collection::vec(0i64..7200, 1..100),
        window_secs in 0u64..7200,
    ) {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let store = MetricStore::new(1000, Notifier::disabled());

        for (i, offset) in offsets.iter().enumerate() {
            let ts = now - chrono::Duration::seconds(*offset);
            store.record_at("api_response_time", i as f64, BTreeMap::new(), ts).unwrap();
        }

        let points = store.query_recent_at(
            "api_response_time",
            Duration::from_secs(window_secs),
            now,
        );
        let expected = offsets.iter().filter(|o| **o as u64 <= window_secs).count();

        prop_assert_eq!(points.len(), expected);
        let cutoff = now - chrono::Duration::seconds(window_secs as i64);
        prop_assert!(points.iter().all(|p| p.timestamp >= cutoff));
    }
}
