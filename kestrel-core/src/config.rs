//! Execution configuration

use serde::{Deserialize, Serialize};

/// Knobs for compiling and driving one query execution.
///
/// Passed explicitly into the boolean compiler and the collectors; there is no
/// process-wide mutable clause limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of clauses a boolean query may carry (nested clauses counted).
    pub max_clause_count: usize,
    /// Number of hits to count exactly before the collector starts raising the
    /// minimum competitive score.
    pub total_hits_threshold: usize,
    /// Every this many hits a sweep pulls the shared competitive score.
    /// Must be a power of two.
    pub threshold_sync_interval: u32,
    /// Default number of hits to return.
    pub top_k: usize,
    /// BM25 parameters for term scoring.
    pub bm25: Bm25Params,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_clause_count: 1024,
            total_hits_threshold: 1000,
            threshold_sync_interval: 1024,
            top_k: 10,
            bm25: Bm25Params::default(),
        }
    }
}

impl SearchConfig {
    /// Mask used to check `hits & mask == 0` for threshold synchronisation.
    #[inline]
    pub fn threshold_sync_mask(&self) -> u64 {
        u64::from(self.threshold_sync_interval.max(1).next_power_of_two()) - 1
    }
}

/// BM25 parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation parameter (typically 1.2-2.0)
    pub k1: f32,
    /// Length normalization parameter (typically 0.75)
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.max_clause_count, 1024);
        assert_eq!(config.threshold_sync_mask(), 1023);
        assert_eq!(config.bm25.k1, 1.2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"max_clause_count": 16, "threshold_sync_interval": 100}"#)
                .unwrap();
        assert_eq!(config.max_clause_count, 16);
        assert_eq!(config.total_hits_threshold, 1000);
        // rounded up to the next power of two
        assert_eq!(config.threshold_sync_mask(), 127);
    }
}
