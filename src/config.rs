//! Engine-wide tunables, each with a documented default.

/// Recognized configuration options and their effects on chunking,
/// concurrency, caching and predicate-shape strictness.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Row count per chunk; affects parallel granularity and zone-map
    /// resolution.
    pub chunk_size: usize,
    /// Plan cache size before LRU-style eviction.
    pub cache_capacity: usize,
    /// Minimum selected-count to switch from sequential to parallel
    /// materialization.
    pub parallel_threshold: usize,
    /// Rows per parallel materialization task.
    pub parallel_chunk_span: usize,
    /// Below this cardinality, grouped aggregation uses array accumulators.
    pub small_cardinality_threshold: usize,
    /// If true, unsupported predicate shapes fail with `not_supported`; if
    /// false, they fall through to a materializing slow path.
    pub strict_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16_384,
            cache_capacity: 256,
            parallel_threshold: 10_000,
            parallel_chunk_span: 4_096,
            small_cardinality_threshold: 256,
            strict_mode: true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size, 16_384);
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.parallel_threshold, 10_000);
        assert_eq!(config.parallel_chunk_span, 4_096);
        assert_eq!(config.small_cardinality_threshold, 256);
        assert!(config.strict_mode);
    }
}
