//! Conjunction (AND) of scorers
//!
//! Leapfrog intersection: the cheapest clause leads, every other clause is
//! advanced to the lead's doc, and any clause landing further moves the lead
//! forward again. Two-phase clauses are intersected on their approximations and
//! confirmed afterwards, cheapest match cost first.

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::max_score::sum_upper_bound;
use super::traits::Scorer;

struct Clause<'a> {
    scorer: Box<dyn Scorer + 'a>,
    scoring: bool,
}

/// Intersection of required clauses. Only `scoring` clauses add to the score.
pub struct ConjunctionScorer<'a> {
    /// Sorted by ascending cost: `clauses[0]` leads.
    clauses: Vec<Clause<'a>>,
    /// Two-phase clause indices by ascending match cost.
    two_phase: Vec<usize>,
    num_scoring: usize,
    match_cost: Option<f32>,
}

impl<'a> ConjunctionScorer<'a> {
    /// Intersect `scoring` and `non_scoring` clauses; positions on the first
    /// common candidate. At least one clause is required.
    pub fn new(
        scoring: Vec<Box<dyn Scorer + 'a>>,
        non_scoring: Vec<Box<dyn Scorer + 'a>>,
    ) -> Result<Self> {
        let num_scoring = scoring.len();
        let mut clauses: Vec<Clause<'a>> = scoring
            .into_iter()
            .map(|scorer| Clause {
                scorer,
                scoring: true,
            })
            .chain(non_scoring.into_iter().map(|scorer| Clause {
                scorer,
                scoring: false,
            }))
            .collect();
        if clauses.is_empty() {
            return Err(crate::Error::Query(
                "conjunction needs at least one clause".to_string(),
            ));
        }
        clauses.sort_by_key(|c| c.scorer.cost());

        let mut two_phase: Vec<(usize, f32)> = clauses
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.scorer.match_cost().map(|cost| (i, cost)))
            .collect();
        two_phase.sort_by(|a, b| a.1.total_cmp(&b.1));
        let match_cost = if two_phase.is_empty() {
            None
        } else {
            Some(two_phase.iter().map(|&(_, cost)| cost).sum())
        };

        let mut conjunction = Self {
            clauses,
            two_phase: two_phase.into_iter().map(|(i, _)| i).collect(),
            num_scoring,
            match_cost,
        };
        let doc = conjunction.clauses[0].scorer.doc();
        conjunction.do_next(doc)?;
        Ok(conjunction)
    }

    /// Align every clause on `doc` (the lead's position) or a later common doc.
    fn do_next(&mut self, mut doc: DocId) -> Result<DocId> {
        'advance_head: loop {
            if doc == TERMINATED {
                return Ok(TERMINATED);
            }
            for i in 1..self.clauses.len() {
                let next = self.clauses[i].scorer.seek(doc)?;
                if next > doc {
                    // clause beyond the current doc: advance the lead and restart
                    doc = self.clauses[0].scorer.seek(next)?;
                    continue 'advance_head;
                }
            }
            return Ok(doc);
        }
    }
}

impl DocSet for ConjunctionScorer<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.clauses[0].scorer.doc()
    }

    fn advance(&mut self) -> Result<DocId> {
        let doc = self.clauses[0].scorer.advance()?;
        self.do_next(doc)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if target <= self.doc() {
            return Ok(self.doc());
        }
        let doc = self.clauses[0].scorer.seek(target)?;
        self.do_next(doc)
    }

    fn cost(&self) -> u64 {
        self.clauses[0].scorer.cost()
    }

    fn match_cost(&self) -> Option<f32> {
        self.match_cost
    }

    fn matches(&mut self) -> Result<bool> {
        for &i in &self.two_phase {
            if !self.clauses[i].scorer.matches()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Scorer for ConjunctionScorer<'_> {
    fn score(&mut self) -> Result<Score> {
        let mut sum = 0.0f64;
        for clause in self.clauses.iter_mut().filter(|c| c.scoring) {
            sum += f64::from(clause.scorer.score()?);
        }
        Ok(sum as Score)
    }

    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        let mut up_to = TERMINATED;
        for clause in self.clauses.iter_mut().filter(|c| c.scoring) {
            up_to = up_to.min(clause.scorer.advance_shallow(target)?);
        }
        Ok(up_to)
    }

    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        let mut sum = 0.0f64;
        for clause in self.clauses.iter_mut().filter(|c| c.scoring) {
            sum += f64::from(clause.scorer.max_score(up_to)?);
        }
        Ok(sum_upper_bound(sum, self.num_scoring) as Score)
    }

    fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
        // with a single scoring clause its score is the whole score
        if self.num_scoring == 1
            && let Some(clause) = self.clauses.iter_mut().find(|c| c.scoring)
        {
            clause.scorer.set_min_competitive_score(min_score)?;
        }
        Ok(())
    }
}
