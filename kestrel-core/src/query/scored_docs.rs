//! Scorer over precomputed `(doc, score)` results
//!
//! Keeps the max score of every fixed-size block of results so it can take part
//! in block-max pruning like a postings-backed scorer.

use std::sync::Arc;

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::traits::Scorer;

/// Block size used when none is given.
pub const DEFAULT_SCORED_BLOCK: usize = 64;

pub struct ScoredDocsScorer {
    docs: Arc<Vec<(DocId, Score)>>,
    block_max: Vec<Score>,
    block_size: usize,
    pos: usize,
    /// Index of the first entry at or after the last shallow target.
    shallow: usize,
}

/// Max score of every `block_size` entries.
fn block_maxima(docs: &[(DocId, Score)], block_size: usize) -> Vec<Score> {
    docs.chunks(block_size.max(1))
        .map(|block| block.iter().map(|&(_, s)| s).fold(0.0f32, f32::max))
        .collect()
}

impl ScoredDocsScorer {
    /// `docs` must be sorted by strictly increasing doc id, scores non-negative.
    pub fn new(docs: Vec<(DocId, Score)>) -> Self {
        Self::with_block_size(docs, DEFAULT_SCORED_BLOCK)
    }

    pub fn with_block_size(docs: Vec<(DocId, Score)>, block_size: usize) -> Self {
        debug_assert!(docs.windows(2).all(|w| w[0].0 < w[1].0));
        let block_size = block_size.max(1);
        let block_max = block_maxima(&docs, block_size);
        Self {
            docs: Arc::new(docs),
            block_max,
            block_size,
            pos: 0,
            shallow: 0,
        }
    }

    /// Index of the first entry with doc >= `target`.
    fn position_of(&self, target: DocId) -> usize {
        self.pos + self.docs[self.pos..].partition_point(|&(d, _)| d < target)
    }

    /// Inclusive doc bound of block `block`; the last block extends to TERMINATED.
    fn block_up_to(&self, block: usize) -> DocId {
        if block + 1 >= self.block_max.len() {
            TERMINATED
        } else {
            self.docs[(block + 1) * self.block_size - 1].0
        }
    }
}

impl DocSet for ScoredDocsScorer {
    #[inline]
    fn doc(&self) -> DocId {
        self.docs.get(self.pos).map(|&(d, _)| d).unwrap_or(TERMINATED)
    }

    fn advance(&mut self) -> Result<DocId> {
        if self.pos < self.docs.len() {
            self.pos += 1;
        }
        Ok(self.doc())
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        self.pos = self.position_of(target);
        Ok(self.doc())
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

impl Scorer for ScoredDocsScorer {
    #[inline]
    fn score(&mut self) -> Result<Score> {
        Ok(self.docs.get(self.pos).map(|&(_, s)| s).unwrap_or(0.0))
    }

    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        let idx = self.position_of(target);
        self.shallow = self.shallow.max(idx);
        if idx >= self.docs.len() {
            return Ok(TERMINATED);
        }
        Ok(self.block_up_to(idx / self.block_size))
    }

    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        // entries in [start, end) are the reachable docs <= up_to
        let start = self.pos.max(self.shallow);
        let end = start + self.docs[start..].partition_point(|&(d, _)| d <= up_to);
        if end <= start {
            return Ok(0.0);
        }
        let first = start / self.block_size;
        let last = (end - 1) / self.block_size;
        Ok(self.block_max[first..=last]
            .iter()
            .copied()
            .fold(0.0f32, f32::max))
    }
}
