use std::time::Duration;

/// Engine-wide tuning knobs. Every subsystem takes its constants from here
/// so an engine instance is fully described by one value.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Number of frames in the buffer pool
    pub pool_size: usize,
    /// K for the LRU-K replacement policy
    pub replacer_k: usize,
    /// Capacity of one extendible-hash bucket
    pub bucket_size: usize,
    /// Maximum key/value pairs in a B+tree leaf
    pub leaf_max_size: usize,
    /// Maximum children of a B+tree internal node
    pub internal_max_size: usize,
    /// Sleep between deadlock-detection passes
    pub cycle_detection_interval: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            pool_size: 64,
            replacer_k: 2,
            bucket_size: 4,
            leaf_max_size: 64,
            internal_max_size: 64,
            cycle_detection_interval: Duration::from_millis(50),
        }
    }
}
