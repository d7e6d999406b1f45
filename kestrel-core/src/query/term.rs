//! Term query - matches documents containing a specific term

use std::fmt;

use log::trace;

use crate::structures::{MemorySegment, PostingList};
use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::impacts::{ImpactsPostings, MaxScoreCache, SkipUpTo};
use super::similarity::{Bm25Similarity, Similarity};
use super::traits::{Query, ScoreMode, Scorer, ScorerSupplier, SearchContext, Weight};

/// Term query - matches documents containing a specific term
#[derive(Debug, Clone)]
pub struct TermQuery {
    pub term: String,
    pub boost: Score,
}

impl TermQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            boost: 1.0,
        }
    }

    /// Lowercased term, matching [`SegmentBuilder::add_text`](crate::SegmentBuilder::add_text).
    pub fn text(text: &str) -> Self {
        Self::new(text.to_lowercase())
    }

    pub fn with_boost(mut self, boost: Score) -> Self {
        self.boost = boost;
        self
    }
}

impl fmt::Display for TermQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.boost == 1.0 {
            write!(f, "{}", self.term)
        } else {
            write!(f, "{}^{}", self.term, self.boost)
        }
    }
}

impl Query for TermQuery {
    fn weight(&self, ctx: &SearchContext<'_>) -> Result<Box<dyn Weight>> {
        let similarity = Bm25Similarity::from_stats(
            ctx.stats.doc_freq(&self.term),
            ctx.stats.total_docs(),
            ctx.stats.avg_doc_len(),
            self.boost,
            ctx.config.bm25,
        );
        Ok(Box::new(TermWeight {
            term: self.term.clone(),
            similarity,
            score_mode: ctx.score_mode,
        }))
    }
}

/// Term weight: owns the term's similarity, shared by every segment's scorer.
#[derive(Debug)]
pub struct TermWeight {
    term: String,
    similarity: Bm25Similarity,
    score_mode: ScoreMode,
}

impl Weight for TermWeight {
    fn scorer_supplier<'a>(
        &'a self,
        segment: &'a MemorySegment,
    ) -> Result<Option<Box<dyn ScorerSupplier<'a> + 'a>>> {
        Ok(segment.postings(&self.term).map(|list| {
            Box::new(TermScorerSupplier { weight: self, list }) as Box<dyn ScorerSupplier<'a> + 'a>
        }))
    }
}

struct TermScorerSupplier<'a> {
    weight: &'a TermWeight,
    list: &'a PostingList,
}

impl<'a> ScorerSupplier<'a> for TermScorerSupplier<'a> {
    fn cost(&self) -> u64 {
        u64::from(self.list.doc_count())
    }

    fn get(self: Box<Self>, _lead_cost: u64) -> Result<Box<dyn Scorer + 'a>> {
        let similarity = &self.weight.similarity;
        let global_max = self
            .list
            .global_impacts()
            .iter()
            .map(|impact| similarity.score(impact.freq, impact.norm))
            .fold(0.0f32, f32::max);
        Ok(Box::new(TermScorer::new(
            self.list.cursor()?,
            similarity,
            global_max,
            self.weight.score_mode,
        )))
    }
}

/// Scores the docs of one postings list.
///
/// In [`ScoreMode::TopScores`] the scorer skips whole impact blocks whose max
/// score is below the minimum competitive score.
pub struct TermScorer<'a, P> {
    postings: P,
    similarity: &'a dyn Similarity,
    cache: MaxScoreCache,
    prune: bool,
    min_competitive_score: Score,
    /// Last doc of the block most recently found competitive.
    up_to: Option<DocId>,
}

impl<'a, P: ImpactsPostings> TermScorer<'a, P> {
    pub fn new(
        postings: P,
        similarity: &'a dyn Similarity,
        global_max_score: Score,
        score_mode: ScoreMode,
    ) -> Self {
        Self {
            postings,
            similarity,
            cache: MaxScoreCache::new(global_max_score.min(similarity.max_score())),
            prune: score_mode == ScoreMode::TopScores,
            min_competitive_score: 0.0,
            up_to: None,
        }
    }

    /// First doc at or after `target` that lies in a competitive block.
    fn advance_target(&mut self, target: DocId) -> Result<DocId> {
        if let Some(up_to) = self.up_to
            && target <= up_to
        {
            return Ok(target);
        }

        let mut target = target;
        self.postings.advance_shallow(target)?;
        let mut up_to = self.postings.doc_id_up_to(0);
        let mut block_max = self
            .cache
            .max_score_for_level(&self.postings, self.similarity, 0);

        while block_max < self.min_competitive_score {
            if up_to == TERMINATED {
                target = TERMINATED;
                break;
            }
            match self
                .cache
                .skip_up_to(&self.postings, self.similarity, self.min_competitive_score)
            {
                SkipUpTo::Competitive => break,
                SkipUpTo::Exhausted => {
                    target = TERMINATED;
                    up_to = TERMINATED;
                    break;
                }
                SkipUpTo::NonCompetitiveUpTo(skip) => {
                    target = skip + 1;
                    self.postings.advance_shallow(target)?;
                    up_to = self.postings.doc_id_up_to(0);
                    block_max = self
                        .cache
                        .max_score_for_level(&self.postings, self.similarity, 0);
                }
            }
        }

        self.up_to = Some(up_to);
        Ok(target)
    }
}

impl<P: ImpactsPostings> DocSet for TermScorer<'_, P> {
    #[inline]
    fn doc(&self) -> DocId {
        self.postings.doc()
    }

    fn advance(&mut self) -> Result<DocId> {
        let doc = self.postings.doc();
        if !self.prune || doc == TERMINATED || self.up_to.is_some_and(|up_to| doc < up_to) {
            return self.postings.advance();
        }
        self.seek(doc + 1)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if !self.prune {
            return self.postings.seek(target);
        }
        let doc = self.postings.doc();
        if target <= doc {
            return Ok(doc);
        }
        let target = self.advance_target(target)?;
        self.postings.seek(target)
    }

    fn cost(&self) -> u64 {
        self.postings.cost()
    }
}

impl<P: ImpactsPostings> Scorer for TermScorer<'_, P> {
    #[inline]
    fn score(&mut self) -> Result<Score> {
        Ok(self
            .similarity
            .score(self.postings.term_freq(), self.postings.norm()))
    }

    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        self.postings.advance_shallow(target)?;
        Ok(self.postings.doc_id_up_to(0))
    }

    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        Ok(self.cache.max_score(&self.postings, self.similarity, up_to))
    }

    fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
        if self.prune && min_score > self.min_competitive_score {
            trace!("TermScorer: min competitive score raised to {}", min_score);
            self.min_competitive_score = min_score;
        }
        Ok(())
    }
}
