//! Required clause minus excluded clause
//!
//! The result is always two-phase: the required clause provides candidates and
//! `matches()` checks the exclusion. This lets an enclosing conjunction
//! intersect first and only pay for the exclusion check on common candidates.

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::traits::Scorer;

/// Fixed overhead of one confirmation.
const BASE_MATCH_COST: f32 = 2.0;
/// Cost of seeking the excluded cursor once.
const EXCL_SEEK_COST: f32 = 10.0;

pub struct ReqExclScorer<'a> {
    req: Box<dyn Scorer + 'a>,
    excl: Box<dyn Scorer + 'a>,
    match_cost: f32,
}

impl<'a> ReqExclScorer<'a> {
    pub fn new(req: Box<dyn Scorer + 'a>, excl: Box<dyn Scorer + 'a>) -> Self {
        let match_cost = Self::compute_match_cost(req.as_ref(), excl.as_ref());
        Self {
            req,
            excl,
            match_cost,
        }
    }

    /// The excluded cursor is consulted at most once per required candidate,
    /// and at most as often as it has docs.
    fn compute_match_cost(req: &dyn Scorer, excl: &dyn Scorer) -> f32 {
        let (req_cost, excl_cost) = (req.cost(), excl.cost());
        let ratio = if req_cost == 0 {
            1.0
        } else if excl_cost == 0 {
            0.0
        } else {
            req_cost.min(excl_cost) as f32 / req_cost as f32
        };
        BASE_MATCH_COST
            + req.match_cost().unwrap_or(0.0)
            + ratio * (EXCL_SEEK_COST + excl.match_cost().unwrap_or(0.0))
    }

    /// True when the excluded clause matches the current candidate.
    fn excluded(&mut self) -> Result<bool> {
        let doc = self.req.doc();
        let excl_doc = self.excl.seek(doc)?;
        Ok(excl_doc == doc && self.excl.matches()?)
    }
}

impl DocSet for ReqExclScorer<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.req.doc()
    }

    fn advance(&mut self) -> Result<DocId> {
        self.req.advance()
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        self.req.seek(target)
    }

    fn cost(&self) -> u64 {
        self.req.cost()
    }

    fn match_cost(&self) -> Option<f32> {
        Some(self.match_cost)
    }

    fn matches(&mut self) -> Result<bool> {
        if self.req.doc() == TERMINATED {
            return Ok(false);
        }
        let req_cost = self.req.match_cost();
        let excl_cost = self.excl.match_cost();
        // run the cheaper check first
        if req_cost.unwrap_or(0.0) <= excl_cost.unwrap_or(0.0) {
            Ok(self.req.matches()? && !self.excluded()?)
        } else {
            Ok(!self.excluded()? && self.req.matches()?)
        }
    }
}

impl Scorer for ReqExclScorer<'_> {
    #[inline]
    fn score(&mut self) -> Result<Score> {
        self.req.score()
    }

    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        self.req.advance_shallow(target)
    }

    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        self.req.max_score(up_to)
    }

    fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
        self.req.set_min_competitive_score(min_score)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::constant::ConstantScorer;
    use crate::query::docset::{SortedVecDocSet, collect_docs};
    use crate::query::scored_docs::ScoredDocsScorer;
    use crate::query::traits::ScoreMode;
    use crate::query::two_phase::{TwoPhaseConfirmed, TwoPhaseFilter};

    fn docs(ids: &[DocId]) -> Box<dyn Scorer + 'static> {
        Box::new(ConstantScorer::new(
            SortedVecDocSet::new(Arc::new(ids.to_vec())),
            1.0,
            ScoreMode::Complete,
        ))
    }

    #[test]
    fn test_exclusion() {
        let mut scorer = ReqExclScorer::new(docs(&[1, 2, 3, 5, 8, 13]), docs(&[2, 5, 6, 13]));
        assert!(scorer.is_two_phase());
        assert_eq!(scorer.cost(), 6);
        assert_eq!(collect_docs(&mut scorer).unwrap(), vec![1, 3, 8]);
    }

    #[test]
    fn test_confirmed_view_skips_excluded() {
        let scorer = ReqExclScorer::new(docs(&[1, 2, 3]), docs(&[1, 3]));
        let mut confirmed = TwoPhaseConfirmed::new(scorer).unwrap();
        assert_eq!(confirmed.doc(), 2);
        assert_eq!(confirmed.advance().unwrap(), TERMINATED);
    }

    #[test]
    fn test_two_phase_excluded_clause() {
        // excluded candidates 2 and 4, but only 4 really matches
        let excl = TwoPhaseFilter::new(SortedVecDocSet::new(Arc::new(vec![2, 4])), 3.0, |d| {
            Ok(d == 4)
        });
        let mut scorer = ReqExclScorer::new(
            docs(&[1, 2, 3, 4]),
            Box::new(ConstantScorer::filter(excl)),
        );
        assert_eq!(collect_docs(&mut scorer).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_match_cost() {
        let scorer = ReqExclScorer::new(docs(&[1, 2, 3, 4]), docs(&[2, 4]));
        // 2 + 0 + (2 / 4) * 10
        assert_eq!(scorer.match_cost(), Some(7.0));
        let scorer = ReqExclScorer::new(docs(&[1, 2]), docs(&[]));
        assert_eq!(scorer.match_cost(), Some(2.0));
    }

    #[test]
    fn test_scores_come_from_required() {
        let mut scorer = ReqExclScorer::new(
            Box::new(ScoredDocsScorer::new(vec![(1, 2.0), (4, 5.0)])),
            docs(&[1]),
        );
        assert!(!scorer.matches().unwrap());
        assert_eq!(scorer.advance().unwrap(), 4);
        assert!(scorer.matches().unwrap());
        assert_eq!(scorer.score().unwrap(), 5.0);
        assert_eq!(scorer.max_score(TERMINATED).unwrap(), 5.0);
    }
}
