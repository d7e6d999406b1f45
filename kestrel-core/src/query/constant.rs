//! Constant-score scorer over any doc set

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::traits::{ScoreMode, Scorer};

/// Gives every doc of a doc set the same score.
///
/// Two-phase doc sets stay two-phase. In [`ScoreMode::TopScores`] a minimum
/// competitive score above the constant exhausts the scorer.
pub struct ConstantScorer<D> {
    docs: D,
    score: Score,
    score_mode: ScoreMode,
    exhausted: bool,
}

impl<D: DocSet> ConstantScorer<D> {
    pub fn new(docs: D, score: Score, score_mode: ScoreMode) -> Self {
        Self {
            docs,
            score,
            score_mode,
            exhausted: false,
        }
    }

    /// Zero-scoring wrapper, used when only FILTER clauses are required but the
    /// caller needs scores.
    pub fn filter(docs: D) -> Self {
        Self::new(docs, 0.0, ScoreMode::Complete)
    }
}

impl<D: DocSet> DocSet for ConstantScorer<D> {
    #[inline]
    fn doc(&self) -> DocId {
        if self.exhausted {
            TERMINATED
        } else {
            self.docs.doc()
        }
    }

    fn advance(&mut self) -> Result<DocId> {
        if self.exhausted {
            return Ok(TERMINATED);
        }
        self.docs.advance()
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.exhausted {
            return Ok(TERMINATED);
        }
        self.docs.seek(target)
    }

    fn cost(&self) -> u64 {
        self.docs.cost()
    }

    fn match_cost(&self) -> Option<f32> {
        self.docs.match_cost()
    }

    fn matches(&mut self) -> Result<bool> {
        self.docs.matches()
    }
}

impl<D: DocSet> Scorer for ConstantScorer<D> {
    #[inline]
    fn score(&mut self) -> Result<Score> {
        Ok(self.score)
    }

    fn max_score(&mut self, _up_to: DocId) -> Result<Score> {
        Ok(self.score)
    }

    fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
        if self.score_mode == ScoreMode::TopScores && min_score > self.score {
            self.exhausted = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::docset::SortedVecDocSet;
    use crate::query::two_phase::TwoPhaseFilter;

    #[test]
    fn test_constant_scores() {
        let mut scorer =
            ConstantScorer::new(SortedVecDocSet::new(Arc::new(vec![3, 6])), 2.5, ScoreMode::Complete);
        assert_eq!(scorer.doc(), 3);
        assert_eq!(scorer.score().unwrap(), 2.5);
        assert_eq!(scorer.max_score(TERMINATED).unwrap(), 2.5);
        // not pruning outside TopScores
        scorer.set_min_competitive_score(3.0).unwrap();
        assert_eq!(scorer.advance().unwrap(), 6);
    }

    #[test]
    fn test_top_scores_threshold_exhausts() {
        let mut scorer = ConstantScorer::new(
            SortedVecDocSet::new(Arc::new(vec![3, 6])),
            1.0,
            ScoreMode::TopScores,
        );
        scorer.set_min_competitive_score(1.0).unwrap();
        assert_eq!(scorer.doc(), 3);
        scorer.set_min_competitive_score(1.5).unwrap();
        assert_eq!(scorer.doc(), TERMINATED);
        assert_eq!(scorer.advance().unwrap(), TERMINATED);
    }

    #[test]
    fn test_filter_keeps_two_phase() {
        let docs = TwoPhaseFilter::new(SortedVecDocSet::new(Arc::new(vec![1, 2])), 3.0, |d| {
            Ok(d == 2)
        });
        let mut scorer = ConstantScorer::filter(docs);
        assert_eq!(scorer.match_cost(), Some(3.0));
        assert!(!scorer.matches().unwrap());
        assert_eq!(scorer.score().unwrap(), 0.0);
    }
}
