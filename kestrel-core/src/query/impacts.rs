//! Impacts view over postings and the per-level max score cache
//!
//! An impacts source describes a small hierarchy of levels. Level 0 is the
//! finest (one postings block); each level names the last doc id it covers and
//! the competitive `(freq, norm)` impacts of that range. Higher levels cover at
//! least the range of the lower ones.

use crate::structures::Impact;
use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::similarity::Similarity;

/// Postings cursor with per-document frequency and length norm.
pub trait Postings: DocSet {
    fn term_freq(&self) -> u32;
    fn norm(&self) -> u32;
}

/// Block-level score bounds of a postings list.
pub trait ImpactsSource {
    /// Move the impacts view to the blocks containing `target`. Never moves the
    /// underlying cursor, never moves the view backwards.
    fn advance_shallow(&mut self, target: DocId) -> Result<()>;

    /// Number of levels, at least 1.
    fn num_levels(&self) -> usize;

    /// Last doc id covered by `level`. Non-decreasing in `level`.
    fn doc_id_up_to(&self, level: usize) -> DocId;

    /// Competitive impacts valid up to `doc_id_up_to(level)`.
    fn impacts(&self, level: usize) -> &[Impact];
}

/// Postings with an impacts view, the input of a term scorer.
pub trait ImpactsPostings: Postings + ImpactsSource {}

impl<T: Postings + ImpactsSource> ImpactsPostings for T {}

/// Gives postings without skip data a single level spanning the whole doc id
/// space, whose one impact bounds any `(freq, norm)`.
pub struct UnboundedImpacts<P> {
    postings: P,
}

const UNBOUNDED_IMPACT: [Impact; 1] = [Impact {
    freq: u32::MAX,
    norm: 0,
}];

impl<P: Postings> UnboundedImpacts<P> {
    pub fn new(postings: P) -> Self {
        Self { postings }
    }
}

impl<P: Postings> DocSet for UnboundedImpacts<P> {
    #[inline]
    fn doc(&self) -> DocId {
        self.postings.doc()
    }
    #[inline]
    fn advance(&mut self) -> Result<DocId> {
        self.postings.advance()
    }
    #[inline]
    fn seek(&mut self, target: DocId) -> Result<DocId> {
        self.postings.seek(target)
    }
    fn cost(&self) -> u64 {
        self.postings.cost()
    }
}

impl<P: Postings> Postings for UnboundedImpacts<P> {
    #[inline]
    fn term_freq(&self) -> u32 {
        self.postings.term_freq()
    }
    #[inline]
    fn norm(&self) -> u32 {
        self.postings.norm()
    }
}

impl<P: Postings> ImpactsSource for UnboundedImpacts<P> {
    fn advance_shallow(&mut self, _target: DocId) -> Result<()> {
        Ok(())
    }

    fn num_levels(&self) -> usize {
        1
    }

    fn doc_id_up_to(&self, _level: usize) -> DocId {
        TERMINATED
    }

    fn impacts(&self, _level: usize) -> &[Impact] {
        &UNBOUNDED_IMPACT
    }
}

/// Outcome of [`MaxScoreCache::skip_up_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipUpTo {
    /// The finest level may hold competitive docs: nothing to skip.
    Competitive,
    /// Every doc up to and including this id is below the threshold.
    NonCompetitiveUpTo(DocId),
    /// Nothing left in the postings can reach the threshold.
    Exhausted,
}

/// Memoized per-level max scores of one impacts source.
///
/// A level's max score is recomputed only when that level's upper bound moves.
#[derive(Debug, Clone)]
pub struct MaxScoreCache {
    global_max_score: Score,
    cached_up_to: Vec<Option<DocId>>,
    cached_max: Vec<Score>,
}

impl MaxScoreCache {
    /// `global_max_score` bounds every doc and is the fallback when no level
    /// reaches far enough.
    pub fn new(global_max_score: Score) -> Self {
        Self {
            global_max_score,
            cached_up_to: Vec::new(),
            cached_max: Vec::new(),
        }
    }

    pub fn global_max_score(&self) -> Score {
        self.global_max_score
    }

    fn ensure_levels(&mut self, num_levels: usize) {
        if self.cached_up_to.len() < num_levels {
            self.cached_up_to.resize(num_levels, None);
            self.cached_max.resize(num_levels, 0.0);
        }
    }

    /// Finest level covering `up_to`, `None` when it lies past every level.
    pub fn level<I: ImpactsSource + ?Sized>(&self, source: &I, up_to: DocId) -> Option<usize> {
        (0..source.num_levels()).find(|&level| up_to <= source.doc_id_up_to(level))
    }

    pub fn max_score_for_level<I: ImpactsSource + ?Sized>(
        &mut self,
        source: &I,
        similarity: &dyn Similarity,
        level: usize,
    ) -> Score {
        self.ensure_levels(level + 1);
        let level_up_to = source.doc_id_up_to(level);
        if self.cached_up_to[level].is_none_or(|cached| cached < level_up_to) {
            let max = source
                .impacts(level)
                .iter()
                .map(|impact| similarity.score(impact.freq, impact.norm))
                .fold(0.0f32, f32::max);
            self.cached_max[level] = max.min(self.global_max_score);
            self.cached_up_to[level] = Some(level_up_to);
        }
        self.cached_max[level]
    }

    /// Upper bound of the score of any doc up to `up_to`.
    pub fn max_score<I: ImpactsSource + ?Sized>(
        &mut self,
        source: &I,
        similarity: &dyn Similarity,
        up_to: DocId,
    ) -> Score {
        match self.level(source, up_to) {
            Some(level) => self.max_score_for_level(source, similarity, level),
            None => self.global_max_score,
        }
    }

    /// Largest range starting at the current impacts block that provably holds
    /// no doc scoring `min_score` or more.
    pub fn skip_up_to<I: ImpactsSource + ?Sized>(
        &mut self,
        source: &I,
        similarity: &dyn Similarity,
        min_score: Score,
    ) -> SkipUpTo {
        let num_levels = source.num_levels();
        let mut skip_level = None;
        for level in 0..num_levels {
            if self.max_score_for_level(source, similarity, level) >= min_score {
                break;
            }
            skip_level = Some(level);
        }
        match skip_level {
            None => SkipUpTo::Competitive,
            Some(level) => match source.doc_id_up_to(level) {
                TERMINATED => SkipUpTo::Exhausted,
                up_to => SkipUpTo::NonCompetitiveUpTo(up_to),
            },
        }
    }
}
