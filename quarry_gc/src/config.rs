//! Collector configuration parameters.
//!
//! All sizes and thresholds are tunable per collector instance and are
//! fixed at construction time. Default values match the workloads the
//! sample binary exercises.

/// Configuration for a collector instance.
///
/// Not every field applies to every back-end: `segment_size` only matters
/// to the segmented copying collector, `semispace_size` and `oom` only to
/// the two-space collector. The thresholds apply everywhere.
///
/// # Example
///
/// ```ignore
/// use quarry_gc::{GcConfig, CopyingCollector};
///
/// // Frequent cycles for a small working set
/// let gc = CopyingCollector::new(GcConfig {
///     segment_size: 64 * 1024,
///     auto_threshold: 256 * 1024,
///     ..Default::default()
/// });
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    // =========================================================================
    // Segmented copying back-end
    // =========================================================================
    /// Size of a standard heap segment in bytes.
    ///
    /// Objects whose total size (header included) exceeds this are placed
    /// in a dedicated large segment instead.
    ///
    /// Default: 1MB
    pub segment_size: usize,

    // =========================================================================
    // Two-space back-end
    // =========================================================================
    /// Size of each semi-space in bytes.
    ///
    /// Total arena memory is 2x this value (from-space + to-space).
    ///
    /// Default: 1MB
    pub semispace_size: usize,

    /// What the two-space collector does when both a collection and a
    /// retry cannot satisfy an allocation.
    ///
    /// Default: [`OomPolicy::Panic`]
    pub oom: OomPolicy,

    // =========================================================================
    // Collection triggers
    // =========================================================================
    /// `allow_collect` runs a cycle if bytes allocated since the last
    /// collection exceed this.
    ///
    /// Default: 1MB
    pub trigger_threshold: usize,

    /// `alloc` forces a cycle if bytes allocated since the last collection
    /// exceed this. With automatic collection enabled, any allocation may
    /// relocate objects; only rooted or pinned references survive it.
    ///
    /// Default: `usize::MAX` (disabled)
    pub auto_threshold: usize,

    // =========================================================================
    // Debugging
    // =========================================================================
    /// Verify segment-list invariants after each segmented collection.
    ///
    /// Default: false (enabled in debug builds)
    pub verify_heap: bool,
}

/// Out-of-memory behavior of the two-space back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OomPolicy {
    /// Failed allocations return a null reference.
    ReturnNull,
    /// Failed allocations panic with a distinguishable message.
    Panic,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            segment_size: 1024 * 1024,
            semispace_size: 1024 * 1024,
            oom: OomPolicy::Panic,
            trigger_threshold: 1024 * 1024,
            auto_threshold: usize::MAX,
            verify_heap: cfg!(debug_assertions),
        }
    }
}

impl GcConfig {
    /// Configuration sized for memory-constrained embeddings.
    pub fn low_memory() -> Self {
        Self {
            segment_size: 64 * 1024,
            semispace_size: 64 * 1024,
            trigger_threshold: 64 * 1024,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_size < 4096 {
            return Err(ConfigError::SegmentTooSmall);
        }
        if self.semispace_size < 4096 {
            return Err(ConfigError::SemiSpaceTooSmall);
        }
        if self.segment_size % 8 != 0 || self.semispace_size % 8 != 0 {
            return Err(ConfigError::UnalignedSize);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Segment size is too small (minimum 4KB).
    SegmentTooSmall,
    /// Semi-space size is too small (minimum 4KB).
    SemiSpaceTooSmall,
    /// Sizes must be multiples of 8 bytes.
    UnalignedSize,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::SegmentTooSmall => write!(f, "segment size must be at least 4KB"),
            ConfigError::SemiSpaceTooSmall => write!(f, "semi-space size must be at least 4KB"),
            ConfigError::UnalignedSize => write!(f, "heap sizes must be multiples of 8 bytes"),
        }
    }
}

impl std::error::Error for ConfigError {}
