//! Query, Weight and Scorer traits
//!
//! Provides the core abstractions for search queries and document scoring.
//! A [`Query`] is compiled once into a [`Weight`] (collection-level statistics,
//! score mode). The weight hands out one [`ScorerSupplier`] per segment, and the
//! supplier builds the [`Scorer`] tree that a collector drives in a single
//! forward sweep.

use std::fmt;

use crate::structures::MemorySegment;
use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::stats::CollectionStats;

/// How scores will be consumed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    /// Every matching doc is visited and scored.
    Complete,
    /// Every matching doc is visited, scores are never read.
    CompleteNoScores,
    /// Only the top hits matter: scorers may skip non-competitive documents
    /// once a minimum competitive score is set.
    TopScores,
}

impl ScoreMode {
    #[inline]
    pub fn needs_scores(self) -> bool {
        !matches!(self, ScoreMode::CompleteNoScores)
    }
}

/// Occurrence kind of a boolean clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    /// Required and scoring.
    Must,
    /// Required, never scores.
    Filter,
    /// Optional and scoring.
    Should,
    /// Prohibited, never scores.
    MustNot,
}

impl Occur {
    #[inline]
    pub fn is_scoring(self) -> bool {
        matches!(self, Occur::Must | Occur::Should)
    }

    #[inline]
    pub fn is_required(self) -> bool {
        matches!(self, Occur::Must | Occur::Filter)
    }
}

/// Scorer: a cursor over matching documents that can also score them.
///
/// Beyond plain scoring, scorers expose block-level score upper bounds
/// (`advance_shallow` + `max_score`) and accept a minimum competitive score,
/// below which they are free to skip documents.
pub trait Scorer: DocSet {
    /// Score for the current document. Only valid on a confirmed match.
    fn score(&mut self) -> Result<Score>;

    /// Prepare score bounds for documents at or after `target` without moving
    /// the cursor. Returns the inclusive end of the block those bounds cover.
    fn advance_shallow(&mut self, _target: DocId) -> Result<DocId> {
        Ok(TERMINATED)
    }

    /// Upper bound of the score of any document between the current position
    /// and `up_to` (inclusive). Must never under-estimate.
    fn max_score(&mut self, up_to: DocId) -> Result<Score>;

    /// Documents scoring below `min_score` are no longer of interest. Called with
    /// non-decreasing values during one sweep.
    fn set_min_competitive_score(&mut self, _min_score: Score) -> Result<()> {
        Ok(())
    }
}

impl DocSet for Box<dyn Scorer + '_> {
    #[inline]
    fn doc(&self) -> DocId {
        (**self).doc()
    }
    #[inline]
    fn advance(&mut self) -> Result<DocId> {
        (**self).advance()
    }
    #[inline]
    fn seek(&mut self, target: DocId) -> Result<DocId> {
        (**self).seek(target)
    }
    #[inline]
    fn cost(&self) -> u64 {
        (**self).cost()
    }
    #[inline]
    fn match_cost(&self) -> Option<f32> {
        (**self).match_cost()
    }
    #[inline]
    fn matches(&mut self) -> Result<bool> {
        (**self).matches()
    }
}

impl Scorer for Box<dyn Scorer + '_> {
    #[inline]
    fn score(&mut self) -> Result<Score> {
        (**self).score()
    }
    #[inline]
    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        (**self).advance_shallow(target)
    }
    #[inline]
    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        (**self).max_score(up_to)
    }
    #[inline]
    fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
        (**self).set_min_competitive_score(min_score)
    }
}

/// Deferred scorer construction for one clause on one segment.
///
/// `cost` is known before building, so the boolean compiler can reason about
/// clause costs and pass the lead cost of the whole tree down to each clause.
pub trait ScorerSupplier<'a> {
    /// Estimated number of matches of the scorer this supplier would build.
    fn cost(&self) -> u64;

    /// Build the scorer. `lead_cost` is the cost of the clause that will lead
    /// iteration of the enclosing tree.
    fn get(self: Box<Self>, lead_cost: u64) -> Result<Box<dyn Scorer + 'a>>;

    /// The scorer will produce the final score and receive minimum competitive
    /// scores straight from the collector, so it may use block-max strategies.
    fn set_top_level_scoring_clause(&mut self) {}
}

/// Supplier around an already-built scorer.
pub struct ReadyScorer<'a> {
    scorer: Box<dyn Scorer + 'a>,
}

impl<'a> ReadyScorer<'a> {
    pub fn new(scorer: impl Scorer + 'a) -> Self {
        Self {
            scorer: Box::new(scorer),
        }
    }

    pub fn boxed(scorer: Box<dyn Scorer + 'a>) -> Self {
        Self { scorer }
    }
}

impl<'a> ScorerSupplier<'a> for ReadyScorer<'a> {
    fn cost(&self) -> u64 {
        self.scorer.cost()
    }

    fn get(self: Box<Self>, _lead_cost: u64) -> Result<Box<dyn Scorer + 'a>> {
        Ok(self.scorer)
    }
}

/// Inputs shared by every weight of one query execution.
pub struct SearchContext<'s> {
    pub score_mode: ScoreMode,
    pub stats: &'s CollectionStats,
    pub config: &'s crate::SearchConfig,
}

/// A search query.
pub trait Query: Send + Sync + fmt::Debug + fmt::Display {
    /// Compile this query against collection-level statistics.
    fn weight(&self, ctx: &SearchContext<'_>) -> Result<Box<dyn Weight>>;

    /// Number of leaf clauses, nested boolean clauses included.
    fn clause_count(&self) -> usize {
        1
    }
}

/// Compiled, segment-independent form of a query.
///
/// Weights are shared by the sweeps of all segments; per-segment state lives
/// in the scorers they build.
pub trait Weight: Send + Sync {
    /// `None` when nothing in `segment` can match.
    fn scorer_supplier<'a>(
        &'a self,
        segment: &'a MemorySegment,
    ) -> Result<Option<Box<dyn ScorerSupplier<'a> + 'a>>>;

    /// Build the scorer directly, leading with its own cost.
    fn scorer<'a>(&'a self, segment: &'a MemorySegment) -> Result<Option<Box<dyn Scorer + 'a>>> {
        match self.scorer_supplier(segment)? {
            Some(supplier) => {
                let cost = supplier.cost();
                supplier.get(cost).map(Some)
            }
            None => Ok(None),
        }
    }
}
