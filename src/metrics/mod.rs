//! Metrics module
//!
//! In-memory time series for the built-in and caller-registered metrics.

mod proptest;
mod store;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use store::{
    MetricPoint, MetricStore, MetricSummary, TimeSeries, BUILTIN_SERIES, DEFAULT_SERIES_CAPACITY,
};

/// Start of the window `[now - window, ..]`.
///
/// `None` means the window reaches further back than any representable
/// timestamp, i.e. every point qualifies.
pub(crate) fn window_start(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start() {
        let now = Utc::now();
        assert_eq!(
            window_start(now, Duration::from_secs(60)),
            Some(now - chrono::Duration::seconds(60))
        );
        assert_eq!(window_start(now, Duration::from_secs(u64::MAX)), None);
    }
}
