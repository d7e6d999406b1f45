//! Lazy collection statistics for cross-segment term weighting
//!
//! Every segment's term scorers must share one IDF and one average length:
//! otherwise max-score bounds of different segments are not comparable, and a
//! competitive score shared between concurrent segment sweeps would prune
//! docs it should not.
//!
//! Document frequencies are summed over segments the first time a term is
//! weighted and cached per term for the lifetime of the segment snapshot.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::structures::MemorySegment;

/// Statistics bound to a fixed set of segments
pub struct CollectionStats {
    segments: Vec<Arc<MemorySegment>>,
    /// Total documents (computed once on construction)
    total_docs: u64,
    avg_doc_len: f32,
    /// Cached doc frequencies: term -> docs containing it
    doc_freq_cache: RwLock<FxHashMap<String, u64>>,
}

impl CollectionStats {
    pub fn new(segments: Vec<Arc<MemorySegment>>) -> Self {
        let total_docs: u64 = segments.iter().map(|s| u64::from(s.num_docs())).sum();
        let total_len: u64 = segments.iter().map(|s| s.total_len()).sum();
        let avg_doc_len = if total_docs > 0 {
            (total_len as f64 / total_docs as f64) as f32
        } else {
            1.0
        };
        Self {
            segments,
            total_docs,
            avg_doc_len,
            doc_freq_cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Statistics of a single segment.
    pub fn for_segment(segment: &Arc<MemorySegment>) -> Self {
        Self::new(vec![Arc::clone(segment)])
    }

    /// Total documents across all segments
    #[inline]
    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    #[inline]
    pub fn avg_doc_len(&self) -> f32 {
        self.avg_doc_len
    }

    /// Get or compute the collection-wide doc frequency of a term (lazy + cached)
    pub fn doc_freq(&self, term: &str) -> u64 {
        // Fast path: check cache
        if let Some(&df) = self.doc_freq_cache.read().get(term) {
            return df;
        }

        // Slow path: compute and cache
        let df = self
            .segments
            .iter()
            .map(|s| u64::from(s.doc_freq(term)))
            .sum();
        self.doc_freq_cache.write().insert(term.to_string(), df);
        df
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }
}

impl std::fmt::Debug for CollectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStats")
            .field("total_docs", &self.total_docs)
            .field("avg_doc_len", &self.avg_doc_len)
            .field("num_segments", &self.segments.len())
            .field("cached_terms", &self.doc_freq_cache.read().len())
            .finish()
    }
}
