use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing indexing and retrieval activity.
#[derive(Default)]
pub struct IngestMetrics {
    index_runs: AtomicU64,
    chunks_added: AtomicU64,
    chunks_skipped: AtomicU64,
    queries: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed indexing run.
    pub fn record_index(&self, added: u64, skipped: u64) {
        self.index_runs.fetch_add(1, Ordering::Relaxed);
        self.chunks_added.fetch_add(added, Ordering::Relaxed);
        self.chunks_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    /// Record a similarity query.
    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            index_runs: self.index_runs.load(Ordering::Relaxed),
            chunks_added: self.chunks_added.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Indexing runs completed since startup.
    pub index_runs: u64,
    /// Chunks written across all runs.
    pub chunks_added: u64,
    /// Chunks skipped because their identity was already stored.
    pub chunks_skipped: u64,
    /// Similarity queries served.
    pub queries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_runs_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_index(4, 0);
        metrics.record_index(0, 4);
        metrics.record_query();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.index_runs, 2);
        assert_eq!(snapshot.chunks_added, 4);
        assert_eq!(snapshot.chunks_skipped, 4);
        assert_eq!(snapshot.queries, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(IngestMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
