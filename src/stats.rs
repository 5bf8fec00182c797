//! Thread-safe statistics tracking.
//!
//! Counters live behind their own short-lived lock, so they are eventually
//! consistent with the operations that triggered them and never extend the
//! facade's critical sections.

use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use crate::schema::DatabaseStats;

pub struct StatsTracker {
    stats: RwLock<DatabaseStats>,
}

impl StatsTracker {
    pub fn new(dimensions: usize) -> Self {
        Self {
            stats: RwLock::new(DatabaseStats {
                vector_count: 0,
                dimensions,
                index_type: "hnsw".to_string(),
                search_requests: 0,
                insert_requests: 0,
                delete_requests: 0,
                average_latency: Duration::ZERO,
                last_updated: Utc::now(),
                memory_usage_bytes: 0,
            }),
        }
    }

    pub fn record_search(&self) {
        let mut stats = self.stats.write();
        stats.search_requests += 1;
        stats.last_updated = Utc::now();
    }

    pub fn record_insert(&self) {
        let mut stats = self.stats.write();
        stats.insert_requests += 1;
        stats.last_updated = Utc::now();
    }

    pub fn record_delete(&self) {
        let mut stats = self.stats.write();
        stats.delete_requests += 1;
        stats.last_updated = Utc::now();
    }

    /// Fold a new sample into the running latency average.
    pub fn record_latency(&self, latency: Duration) {
        let mut stats = self.stats.write();
        if stats.average_latency.is_zero() {
            stats.average_latency = latency;
        } else {
            stats.average_latency = (stats.average_latency + latency) / 2;
        }
        stats.last_updated = Utc::now();
    }

    pub fn set_vector_count(&self, count: u64) {
        let mut stats = self.stats.write();
        stats.vector_count = count;
        stats.last_updated = Utc::now();
    }

    pub fn snapshot(&self) -> DatabaseStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let tracker = StatsTracker::new(8);
        tracker.record_insert();
        tracker.record_insert();
        tracker.record_search();
        tracker.record_delete();
        tracker.set_vector_count(2);

        let stats = tracker.snapshot();
        assert_eq!(stats.insert_requests, 2);
        assert_eq!(stats.search_requests, 1);
        assert_eq!(stats.delete_requests, 1);
        assert_eq!(stats.vector_count, 2);
        assert_eq!(stats.dimensions, 8);
        assert_eq!(stats.index_type, "hnsw");
    }

    #[test]
    fn test_latency_moving_average() {
        let tracker = StatsTracker::new(4);
        tracker.record_latency(Duration::from_millis(10));
        assert_eq!(tracker.snapshot().average_latency, Duration::from_millis(10));

        tracker.record_latency(Duration::from_millis(20));
        assert_eq!(tracker.snapshot().average_latency, Duration::from_millis(15));
    }
}
