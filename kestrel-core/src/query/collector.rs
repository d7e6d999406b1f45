//! Search result collection
//!
//! A collector is fed the confirmed matches of one segment sweep in doc id
//! order. [`TopKCollector`] keeps the best `k` hits and, once enough hits have
//! been counted, feeds the score of its worst kept hit back into the scorer
//! tree as the minimum competitive score.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use log::{debug, trace};

use crate::structures::MemorySegment;
use crate::{DocId, Result, Score, SearchConfig};

use super::accumulator::{HitsThresholdChecker, MaxScoreAccumulator};
use super::docset::{DocSet, TERMINATED};
use super::traits::{ScoreMode, Scorer, Weight};

/// Whether a sweep should go on after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStatus {
    Continue,
    /// The collector has what it needs. Not an error: the sweep ends early
    /// and its results are complete for the collector's purpose.
    Terminate,
}

/// A hit with its global doc id.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoredDoc {
    pub doc: DocId,
    pub score: Score,
}

impl ScoredDoc {
    pub fn new(doc: DocId, score: Score) -> Self {
        Self { doc, score }
    }

    /// Score descending, then doc ascending.
    #[inline]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.doc.cmp(&other.doc))
    }
}

/// Heap entry: the greatest entry is the worst ranked hit.
#[derive(Debug, Clone, Copy)]
struct Ranked(ScoredDoc);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.rank_cmp(&other.0)
    }
}

/// Whether `total_hits` is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TotalHitsRelation {
    EqualTo,
    /// Pruning may have skipped matching docs without counting them.
    GreaterThanOrEqualTo,
}

/// Ranked hits with the number of matches seen.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TopDocs {
    pub hits: Vec<ScoredDoc>,
    pub total_hits: u64,
    pub relation: TotalHitsRelation,
}

impl TopDocs {
    pub fn empty() -> Self {
        Self {
            hits: Vec::new(),
            total_hits: 0,
            relation: TotalHitsRelation::EqualTo,
        }
    }

    /// Merge per-segment results into the best `k` overall.
    pub fn merge(k: usize, parts: impl IntoIterator<Item = TopDocs>) -> Self {
        let mut merged = Self::empty();
        for part in parts {
            merged.total_hits += part.total_hits;
            if part.relation == TotalHitsRelation::GreaterThanOrEqualTo {
                merged.relation = TotalHitsRelation::GreaterThanOrEqualTo;
            }
            merged.hits.extend(part.hits);
        }
        merged.hits.sort_by(ScoredDoc::rank_cmp);
        merged.hits.truncate(k);
        merged
    }
}

/// Consumer of the matches of segment sweeps.
///
/// Combine collectors with tuples:
/// ```ignore
/// let mut top_k = TopKCollector::new(10);
/// let mut count = CountCollector::new();
/// collect_segment(weight, segment, &mut (&mut top_k, &mut count))?;
/// ```
pub trait Collector {
    /// How the scorer tree feeding this collector must score.
    fn score_mode(&self) -> ScoreMode;

    /// Called once per segment, before its first hit.
    fn begin_segment(&mut self, _doc_base: DocId, _scorer: &mut dyn Scorer) -> Result<()> {
        Ok(())
    }

    /// Called for each confirmed match. `doc` is global (doc base applied);
    /// `scorer` is positioned on it.
    fn collect(&mut self, doc: DocId, scorer: &mut dyn Scorer) -> Result<CollectStatus>;
}

/// Collector for the top-k hits
pub struct TopKCollector {
    k: usize,
    score_mode: ScoreMode,
    heap: BinaryHeap<Ranked>,
    total_hits: u64,
    relation: TotalHitsRelation,
    /// Threshold set on the current segment's scorer.
    min_competitive_score: Score,
    doc_base: DocId,
    hits_checker: Arc<HitsThresholdChecker>,
    accumulator: Option<Arc<MaxScoreAccumulator>>,
    sync_mask: u64,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        Self::with_config(k, &SearchConfig::default())
    }

    pub fn with_config(k: usize, config: &SearchConfig) -> Self {
        Self {
            k,
            score_mode: ScoreMode::TopScores,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1 << 16)),
            total_hits: 0,
            relation: TotalHitsRelation::EqualTo,
            min_competitive_score: 0.0,
            doc_base: 0,
            hits_checker: Arc::new(HitsThresholdChecker::new(config.total_hits_threshold)),
            accumulator: None,
            sync_mask: config.threshold_sync_mask(),
        }
    }

    /// Collector that scores every match and never prunes.
    pub fn exhaustive(k: usize) -> Self {
        let mut collector = Self::new(k);
        collector.score_mode = ScoreMode::Complete;
        collector.hits_checker = Arc::new(HitsThresholdChecker::unbounded());
        collector
    }

    /// Count hits exactly up to `threshold` before pruning.
    pub fn with_total_hits_threshold(mut self, threshold: usize) -> Self {
        self.hits_checker = Arc::new(HitsThresholdChecker::new(threshold));
        self
    }

    /// Share the hit count and the competitive score with collectors of
    /// concurrent segment sweeps.
    pub fn with_shared(
        mut self,
        hits_checker: Arc<HitsThresholdChecker>,
        accumulator: Arc<MaxScoreAccumulator>,
    ) -> Self {
        self.hits_checker = hits_checker;
        self.accumulator = Some(accumulator);
        self
    }

    /// Hits seen so far, pruned ones not included.
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    fn is_full(&self) -> bool {
        self.k > 0 && self.heap.len() >= self.k
    }

    /// Push the worst kept score down once counting is no longer exact.
    fn update_min_competitive_score(&mut self, scorer: &mut dyn Scorer) -> Result<()> {
        if !self.is_full() || !self.hits_checker.is_threshold_reached() {
            return Ok(());
        }
        let Some(worst) = self.heap.peek().map(|r| r.0.score) else {
            return Ok(());
        };
        // later docs lose ties, so only strictly higher scores compete
        let min_score = worst.next_up();
        if min_score > self.min_competitive_score {
            trace!(
                "TopKCollector: min competitive score {} -> {}",
                self.min_competitive_score, min_score
            );
            scorer.set_min_competitive_score(min_score)?;
            self.min_competitive_score = min_score;
            self.relation = TotalHitsRelation::GreaterThanOrEqualTo;
            if let Some(acc) = &self.accumulator {
                acc.accumulate(self.doc_base, worst);
            }
        }
        Ok(())
    }

    /// Adopt the strongest threshold published by other sweeps.
    fn update_global_min_competitive_score(&mut self, scorer: &mut dyn Scorer) -> Result<()> {
        let Some(acc) = &self.accumulator else {
            return Ok(());
        };
        if !self.hits_checker.is_threshold_reached() {
            return Ok(());
        }
        let Some((score, doc_base)) = acc.get() else {
            return Ok(());
        };
        let min_score = if self.doc_base >= doc_base {
            score.next_up()
        } else {
            score
        };
        if min_score > self.min_competitive_score {
            trace!(
                "TopKCollector: global min competitive score {} (from doc base {})",
                min_score, doc_base
            );
            scorer.set_min_competitive_score(min_score)?;
            self.min_competitive_score = min_score;
            self.relation = TotalHitsRelation::GreaterThanOrEqualTo;
        }
        Ok(())
    }

    pub fn into_sorted_hits(self) -> Vec<ScoredDoc> {
        let mut hits: Vec<ScoredDoc> = self.heap.into_iter().map(|r| r.0).collect();
        hits.sort_by(ScoredDoc::rank_cmp);
        hits
    }

    pub fn into_top_docs(self) -> TopDocs {
        let total_hits = self.total_hits;
        let relation = self.relation;
        TopDocs {
            hits: self.into_sorted_hits(),
            total_hits,
            relation,
        }
    }
}

impl Collector for TopKCollector {
    fn score_mode(&self) -> ScoreMode {
        self.score_mode
    }

    fn begin_segment(&mut self, doc_base: DocId, scorer: &mut dyn Scorer) -> Result<()> {
        self.doc_base = doc_base;
        // a fresh scorer tree starts without threshold
        self.min_competitive_score = 0.0;
        self.update_min_competitive_score(scorer)?;
        self.update_global_min_competitive_score(scorer)
    }

    fn collect(&mut self, doc: DocId, scorer: &mut dyn Scorer) -> Result<CollectStatus> {
        let score = scorer.score()?;
        self.total_hits += 1;
        self.hits_checker.increment();
        if self.accumulator.is_some() && (self.total_hits & self.sync_mask) == 0 {
            self.update_global_min_competitive_score(scorer)?;
        }
        if self.k == 0 {
            return Ok(CollectStatus::Continue);
        }

        let hit = ScoredDoc::new(doc, score);
        if self.heap.len() < self.k {
            self.heap.push(Ranked(hit));
        } else {
            let Some(mut worst) = self.heap.peek_mut() else {
                return Ok(CollectStatus::Continue);
            };
            if score <= worst.0.score {
                drop(worst);
                // the hit threshold may have just been crossed
                if self.relation == TotalHitsRelation::EqualTo {
                    self.update_min_competitive_score(scorer)?;
                }
                return Ok(CollectStatus::Continue);
            }
            *worst = Ranked(hit);
        }
        self.update_min_competitive_score(scorer)?;
        Ok(CollectStatus::Continue)
    }
}

/// Collector that counts matching documents, optionally stopping at a limit.
#[derive(Default)]
pub struct CountCollector {
    count: u64,
    limit: Option<u64>,
}

impl CountCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the sweep once `limit` hits are counted.
    pub fn with_limit(limit: u64) -> Self {
        Self {
            count: 0,
            limit: Some(limit),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Collector for CountCollector {
    fn score_mode(&self) -> ScoreMode {
        ScoreMode::CompleteNoScores
    }

    #[inline]
    fn collect(&mut self, _doc: DocId, _scorer: &mut dyn Scorer) -> Result<CollectStatus> {
        self.count += 1;
        if self.limit.is_some_and(|limit| self.count >= limit) {
            return Ok(CollectStatus::Terminate);
        }
        Ok(CollectStatus::Continue)
    }
}

/// Score mode satisfying two collectors.
fn combined_score_mode(a: ScoreMode, b: ScoreMode) -> ScoreMode {
    if a == b {
        a
    } else if a.needs_scores() || b.needs_scores() {
        ScoreMode::Complete
    } else {
        ScoreMode::CompleteNoScores
    }
}

fn both(a: CollectStatus, b: CollectStatus) -> CollectStatus {
    if a == CollectStatus::Terminate && b == CollectStatus::Terminate {
        CollectStatus::Terminate
    } else {
        CollectStatus::Continue
    }
}

// Implement Collector for tuple of 2 collectors
impl<A: Collector, B: Collector> Collector for (&mut A, &mut B) {
    fn score_mode(&self) -> ScoreMode {
        combined_score_mode(self.0.score_mode(), self.1.score_mode())
    }

    fn begin_segment(&mut self, doc_base: DocId, scorer: &mut dyn Scorer) -> Result<()> {
        self.0.begin_segment(doc_base, scorer)?;
        self.1.begin_segment(doc_base, scorer)
    }

    fn collect(&mut self, doc: DocId, scorer: &mut dyn Scorer) -> Result<CollectStatus> {
        let a = self.0.collect(doc, scorer)?;
        let b = self.1.collect(doc, scorer)?;
        Ok(both(a, b))
    }
}

// Implement Collector for tuple of 3 collectors
impl<A: Collector, B: Collector, C: Collector> Collector for (&mut A, &mut B, &mut C) {
    fn score_mode(&self) -> ScoreMode {
        combined_score_mode(
            combined_score_mode(self.0.score_mode(), self.1.score_mode()),
            self.2.score_mode(),
        )
    }

    fn begin_segment(&mut self, doc_base: DocId, scorer: &mut dyn Scorer) -> Result<()> {
        self.0.begin_segment(doc_base, scorer)?;
        self.1.begin_segment(doc_base, scorer)?;
        self.2.begin_segment(doc_base, scorer)
    }

    fn collect(&mut self, doc: DocId, scorer: &mut dyn Scorer) -> Result<CollectStatus> {
        let a = self.0.collect(doc, scorer)?;
        let b = self.1.collect(doc, scorer)?;
        let c = self.2.collect(doc, scorer)?;
        Ok(both(both(a, b), c))
    }
}

/// Sweep one segment, feeding every confirmed match to `collector`.
///
/// The weight must have been built with the collector's score mode. Returns
/// [`CollectStatus::Terminate`] when the collector ended the sweep early.
pub fn collect_segment<C: Collector + ?Sized>(
    weight: &dyn Weight,
    segment: &MemorySegment,
    collector: &mut C,
) -> Result<CollectStatus> {
    let Some(mut supplier) = weight.scorer_supplier(segment)? else {
        return Ok(CollectStatus::Continue);
    };
    if collector.score_mode() == ScoreMode::TopScores {
        supplier.set_top_level_scoring_clause();
    }
    let cost = supplier.cost();
    let mut scorer = supplier.get(cost)?;
    let doc_base = segment.doc_base();
    collector.begin_segment(doc_base, scorer.as_mut())?;

    let mut status = CollectStatus::Continue;
    let mut collected = 0u64;
    let mut doc = scorer.doc();
    while doc != TERMINATED {
        if scorer.matches()? {
            collected += 1;
            if collector.collect(doc_base + doc, scorer.as_mut())? == CollectStatus::Terminate {
                status = CollectStatus::Terminate;
                break;
            }
        }
        doc = scorer.advance()?;
    }

    debug!(
        "Segment sweep done: doc_base={}, cost={}, collected={}, terminated={}",
        doc_base,
        cost,
        collected,
        status == CollectStatus::Terminate
    );
    Ok(status)
}
