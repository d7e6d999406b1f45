//! State shared by the concurrent segment sweeps of one search
//!
//! Both types are lock-free: sweeps on different threads only ever touch them
//! through single atomic operations.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{DocId, Score};

/// Marks an accumulated value. Scores are non-negative, so bit 63 of the
/// packed score is otherwise always clear.
const PRESENT: u64 = 1 << 63;

/// Highest minimum competitive score published by any segment sweep.
///
/// The score and the doc base of the segment that published it are packed into
/// one `u64` that orders by score, then by *lower* doc base, so a plain
/// `fetch_max` keeps the strongest threshold. The doc base matters on ties:
/// segments at or after it collect their docs later and lose ties, so they can
/// require strictly more.
#[derive(Debug, Default)]
pub struct MaxScoreAccumulator {
    packed: AtomicU64,
}

impl MaxScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn encode(doc_base: DocId, score: Score) -> u64 {
        debug_assert!(score >= 0.0, "competitive scores are non-negative");
        PRESENT | (u64::from(score.max(0.0).to_bits()) << 32) | u64::from(DocId::MAX - doc_base)
    }

    #[inline]
    fn decode(packed: u64) -> Option<(Score, DocId)> {
        if packed & PRESENT == 0 {
            return None;
        }
        let score = Score::from_bits(((packed & !PRESENT) >> 32) as u32);
        let doc_base = DocId::MAX - (packed & 0xffff_ffff) as u32;
        Some((score, doc_base))
    }

    /// Publish `score` as the minimum competitive score of the segment starting
    /// at `doc_base`. Keeps the existing value if it is stronger.
    pub fn accumulate(&self, doc_base: DocId, score: Score) {
        self.packed
            .fetch_max(Self::encode(doc_base, score), Ordering::AcqRel);
    }

    /// Strongest published `(score, doc_base)`, if any.
    pub fn get(&self) -> Option<(Score, DocId)> {
        Self::decode(self.packed.load(Ordering::Acquire))
    }
}

/// Counts hits across sweeps and tells when enough have been counted exactly
/// for pruning to start.
#[derive(Debug)]
pub struct HitsThresholdChecker {
    threshold: u64,
    hits: AtomicU64,
}

impl HitsThresholdChecker {
    pub fn new(total_hits_threshold: usize) -> Self {
        Self {
            threshold: total_hits_threshold as u64,
            hits: AtomicU64::new(0),
        }
    }

    /// Never reached: every hit is counted.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    #[inline]
    pub fn increment(&self) {
        self.hits.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn is_threshold_reached(&self) -> bool {
        self.hits.load(Ordering::Acquire) > self.threshold
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Acquire)
    }
}
