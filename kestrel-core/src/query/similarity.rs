//! Scoring functions
//!
//! A [`Similarity`] turns a `(term freq, length norm)` pair into a score for one
//! term. Pruning relies on two properties of every implementation: the score is
//! non-decreasing in term freq for a fixed norm, non-increasing in norm for a
//! fixed freq, and never exceeds [`Similarity::max_score`].

use std::fmt;

use crate::{Bm25Params, Score};

/// Per-term scoring function.
pub trait Similarity: Send + Sync + fmt::Debug {
    fn score(&self, term_freq: u32, norm: u32) -> Score;

    /// Upper bound of `score` over every possible `(freq, norm)`.
    fn max_score(&self) -> Score;
}

/// Compute IDF (Inverse Document Frequency) using BM25 variant
///
/// # Arguments
/// * `doc_freq` - Number of documents containing the term
/// * `total_docs` - Total number of documents in collection
#[inline]
pub fn bm25_idf(doc_freq: f32, total_docs: f32) -> f32 {
    ((total_docs - doc_freq + 0.5) / (doc_freq + 0.5) + 1.0).ln()
}

/// BM25 for one term.
///
/// Written as `w - w / (1 + tf * inv_norm)` so the float result is monotone in
/// both inputs and bounded by `w = boost * idf * (k1 + 1)`.
#[derive(Debug, Clone)]
pub struct Bm25Similarity {
    weight: f32,
    k1: f32,
    b: f32,
    avg_doc_len: f32,
}

impl Bm25Similarity {
    pub fn new(idf: f32, avg_doc_len: f32, boost: f32, params: Bm25Params) -> Self {
        Self {
            weight: boost * idf * (params.k1 + 1.0),
            k1: params.k1,
            b: params.b,
            avg_doc_len: avg_doc_len.max(1.0),
        }
    }

    /// BM25 weighting from collection statistics.
    pub fn from_stats(
        doc_freq: u64,
        total_docs: u64,
        avg_doc_len: f32,
        boost: f32,
        params: Bm25Params,
    ) -> Self {
        let idf = bm25_idf(doc_freq as f32, total_docs.max(doc_freq) as f32);
        Self::new(idf, avg_doc_len, boost, params)
    }

    #[inline]
    fn inv_norm(&self, norm: u32) -> f32 {
        let length_norm = 1.0 - self.b + self.b * (norm as f32 / self.avg_doc_len);
        1.0 / (self.k1 * length_norm)
    }
}

impl Similarity for Bm25Similarity {
    #[inline]
    fn score(&self, term_freq: u32, norm: u32) -> Score {
        let tf = term_freq as f32;
        self.weight - self.weight / (1.0 + tf * self.inv_norm(norm))
    }

    fn max_score(&self) -> Score {
        self.weight
    }
}

/// Every matching doc scores `boost`.
#[derive(Debug, Clone)]
pub struct ConstantSimilarity {
    pub boost: Score,
}

impl Similarity for ConstantSimilarity {
    fn score(&self, _term_freq: u32, _norm: u32) -> Score {
        self.boost
    }

    fn max_score(&self) -> Score {
        self.boost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bm25_idf() {
        // rare terms weigh more
        assert!(bm25_idf(1.0, 1000.0) > bm25_idf(100.0, 1000.0));
        assert!(bm25_idf(1000.0, 1000.0) > 0.0);
    }

    #[test]
    fn test_bm25_monotonic_and_bounded() {
        let sim = Bm25Similarity::from_stats(10, 1000, 20.0, 1.0, Bm25Params::default());
        let max = sim.max_score();
        for norm in [1, 5, 20, 100, 10_000] {
            let mut prev = 0.0;
            for tf in 1..200 {
                let s = sim.score(tf, norm);
                assert!(s >= prev, "tf={} norm={}", tf, norm);
                assert!(s <= max);
                prev = s;
            }
        }
        for tf in [1, 3, 50] {
            assert!(sim.score(tf, 5) >= sim.score(tf, 50));
        }
        assert_eq!(sim.score(0, 10), 0.0);
    }

    #[test]
    fn test_bm25_matches_textbook_form() {
        let params = Bm25Params::default();
        let sim = Bm25Similarity::new(2.0, 10.0, 1.0, params);
        let (tf, len) = (3.0f32, 12.0f32);
        let length_norm = 1.0 - params.b + params.b * (len / 10.0);
        let expected = 2.0 * (tf * (params.k1 + 1.0)) / (tf + params.k1 * length_norm);
        assert!((sim.score(3, 12) - expected).abs() < 1e-5);
    }
}
