//! Lightweight in-process counters for the driver-state store. No external
//! metrics backend is wired up (out of scope); these are exposed so a
//! transport layer can scrape or log them, the way telemetry counters are
//! surfaced elsewhere in this workspace.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DriverStoreMetrics {
    location_updates: AtomicU64,
    nearby_queries: AtomicU64,
    cells_tracked: AtomicU64,
    queued_writes: AtomicU64,
    write_failures: AtomicU64,
    query_latency_micros_total: AtomicU64,
    query_latency_samples: AtomicU64,
}

impl DriverStoreMetrics {
    pub fn record_location_update(&self) {
        self.location_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nearby_query(&self, latency_micros: u64) {
        self.nearby_queries.fetch_add(1, Ordering::Relaxed);
        self.query_latency_micros_total.fetch_add(latency_micros, Ordering::Relaxed);
        self.query_latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_cells_tracked(&self, count: u64) {
        self.cells_tracked.store(count, Ordering::Relaxed);
    }

    pub fn record_queued_write(&self) {
        self.queued_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_flushed(&self) {
        self.queued_writes.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.query_latency_samples.load(Ordering::Relaxed);
        let total = self.query_latency_micros_total.load(Ordering::Relaxed);
        MetricsSnapshot {
            location_updates: self.location_updates.load(Ordering::Relaxed),
            nearby_queries: self.nearby_queries.load(Ordering::Relaxed),
            cells_tracked: self.cells_tracked.load(Ordering::Relaxed),
            queued_writes: self.queued_writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            avg_query_latency_micros: if samples == 0 { 0.0 } else { total as f64 / samples as f64 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub location_updates: u64,
    pub nearby_queries: u64,
    pub cells_tracked: u64,
    pub queued_writes: u64,
    pub write_failures: u64,
    pub avg_query_latency_micros: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_latency_is_zero_with_no_samples() {
        let m = DriverStoreMetrics::default();
        assert_eq!(m.snapshot().avg_query_latency_micros, 0.0);
    }

    #[test]
    fn average_latency_tracks_recorded_samples() {
        let m = DriverStoreMetrics::default();
        m.record_nearby_query(100);
        m.record_nearby_query(200);
        assert_eq!(m.snapshot().avg_query_latency_micros, 150.0);
        assert_eq!(m.snapshot().nearby_queries, 2);
    }

    #[test]
    fn queued_writes_tracks_in_flight_count() {
        let m = DriverStoreMetrics::default();
        m.record_queued_write();
        m.record_queued_write();
        m.record_write_flushed();
        assert_eq!(m.snapshot().queued_writes, 1);
    }
}
