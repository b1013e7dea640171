//! Collection statistics.
//!
//! Tracks allocation volume, collection counts and pause times for
//! monitoring and for the integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters describing one collector instance's activity.
#[derive(Debug)]
pub struct GcStats {
    // =========================================================================
    // Allocation
    // =========================================================================
    /// Total bytes handed out since the collector was created.
    pub bytes_allocated: AtomicU64,
    /// Total objects handed out since the collector was created.
    pub objects_allocated: AtomicU64,

    // =========================================================================
    // Collection
    // =========================================================================
    /// Number of completed collection cycles.
    pub collections: AtomicU64,
    /// Bytes relocated by the copying back-ends.
    pub bytes_copied: AtomicU64,
    /// Bytes reclaimed across all cycles.
    pub bytes_freed: AtomicU64,
    /// Total time spent inside collection cycles (nanoseconds).
    pub gc_time_ns: AtomicU64,

    // =========================================================================
    // Segments
    // =========================================================================
    /// Standard segments returned to the free list.
    pub segments_recycled: AtomicU64,
    /// Segments promoted whole because they host a pinned object.
    pub segments_promoted: AtomicU64,
    /// Large segments released.
    pub large_segments_freed: AtomicU64,

    // =========================================================================
    // Weak references
    // =========================================================================
    /// Weak references cleared because their target died.
    pub weak_cleared: AtomicU64,
    /// Weak references rewritten to a relocated target.
    pub weak_retargeted: AtomicU64,
}

impl GcStats {
    /// Create zeroed statistics.
    pub const fn new() -> Self {
        Self {
            bytes_allocated: AtomicU64::new(0),
            objects_allocated: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            bytes_copied: AtomicU64::new(0),
            bytes_freed: AtomicU64::new(0),
            gc_time_ns: AtomicU64::new(0),
            segments_recycled: AtomicU64::new(0),
            segments_promoted: AtomicU64::new(0),
            large_segments_freed: AtomicU64::new(0),
            weak_cleared: AtomicU64::new(0),
            weak_retargeted: AtomicU64::new(0),
        }
    }

    /// Record one allocation.
    #[inline]
    pub fn record_allocation(&self, size: usize) {
        self.bytes_allocated
            .fetch_add(size as u64, Ordering::Relaxed);
        self.objects_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one finished collection cycle.
    pub fn record_collection(&self, pause: Duration, bytes_freed: usize) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.bytes_freed
            .fetch_add(bytes_freed as u64, Ordering::Relaxed);
        self.gc_time_ns
            .fetch_add(pause.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Number of completed cycles.
    #[inline]
    pub fn collections(&self) -> u64 {
        self.collections.load(Ordering::Relaxed)
    }

    /// Total time spent collecting.
    pub fn total_gc_time(&self) -> Duration {
        Duration::from_nanos(self.gc_time_ns.load(Ordering::Relaxed))
    }

    /// Average pause per cycle.
    pub fn avg_pause(&self) -> Duration {
        let count = self.collections.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.gc_time_ns.load(Ordering::Relaxed) / count)
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for measuring a collection cycle.
pub struct GcTimer {
    start: Instant,
}

impl GcTimer {
    /// Start timing.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Stop and return the elapsed duration.
    pub fn stop(self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_recording() {
        let stats = GcStats::new();

        stats.record_allocation(1024);
        stats.record_allocation(2048);

        assert_eq!(stats.bytes_allocated.load(Ordering::Relaxed), 3072);
        assert_eq!(stats.objects_allocated.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_collection_timing() {
        let stats = GcStats::new();

        stats.record_collection(Duration::from_micros(100), 512);
        stats.record_collection(Duration::from_micros(200), 0);

        assert_eq!(stats.collections(), 2);
        assert_eq!(stats.bytes_freed.load(Ordering::Relaxed), 512);
        assert_eq!(stats.avg_pause(), Duration::from_micros(150));
    }

    #[test]
    fn test_avg_pause_without_collections() {
        let stats = GcStats::new();
        assert_eq!(stats.avg_pause(), Duration::ZERO);
    }
}
