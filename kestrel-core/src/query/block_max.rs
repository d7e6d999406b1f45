//! Block-max conjunction
//!
//! Conjunction of scoring clauses for [`ScoreMode::TopScores`](super::ScoreMode).
//! Iteration walks the lead clause's blocks; any block whose summed max score
//! falls below the minimum competitive score is skipped as a whole before a
//! single doc of it is intersected.

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::max_score::MaxScoreSumPropagator;
use super::traits::Scorer;

pub struct BlockMaxConjunctionScorer<'a> {
    /// Sorted by ascending cost: `scorers[0]` leads.
    scorers: Vec<Box<dyn Scorer + 'a>>,
    propagator: MaxScoreSumPropagator,
    /// Two-phase clause indices by ascending match cost.
    two_phase: Vec<usize>,
    match_cost: Option<f32>,
    min_score: Score,
    /// Inclusive end of the current block, `None` before the first one.
    up_to: Option<DocId>,
    block_max_score: Score,
}

impl<'a> BlockMaxConjunctionScorer<'a> {
    pub fn new(mut scorers: Vec<Box<dyn Scorer + 'a>>) -> Result<Self> {
        if scorers.is_empty() {
            return Err(crate::Error::Query(
                "block-max conjunction needs at least one clause".to_string(),
            ));
        }
        scorers.sort_by_key(|s| s.cost());
        let propagator = MaxScoreSumPropagator::new(&mut scorers)?;

        let mut two_phase: Vec<(usize, f32)> = scorers
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.match_cost().map(|cost| (i, cost)))
            .collect();
        two_phase.sort_by(|a, b| a.1.total_cmp(&b.1));
        let match_cost = if two_phase.is_empty() {
            None
        } else {
            Some(two_phase.iter().map(|&(_, cost)| cost).sum())
        };

        let mut conjunction = Self {
            scorers,
            propagator,
            two_phase: two_phase.into_iter().map(|(i, _)| i).collect(),
            match_cost,
            min_score: 0.0,
            up_to: None,
            block_max_score: 0.0,
        };
        let doc = conjunction.scorers[0].doc();
        conjunction.do_next(doc)?;
        Ok(conjunction)
    }

    fn move_to_next_block(&mut self, target: DocId) -> Result<()> {
        let up_to = self.advance_shallow(target)?;
        self.up_to = Some(up_to);
        self.block_max_score = self.propagator.max_score(&mut self.scorers, up_to)?;
        Ok(())
    }

    /// First doc at or after `target` in a block whose max score is competitive.
    fn advance_target(&mut self, mut target: DocId) -> Result<DocId> {
        if self.up_to.is_none_or(|up_to| target > up_to) {
            self.move_to_next_block(target)?;
        }
        loop {
            if self.block_max_score >= self.min_score {
                return Ok(target);
            }
            let up_to = self.up_to.unwrap_or(TERMINATED);
            if up_to == TERMINATED {
                return Ok(TERMINATED);
            }
            target = up_to + 1;
            self.move_to_next_block(target)?;
        }
    }

    fn do_next(&mut self, mut doc: DocId) -> Result<DocId> {
        'advance_head: loop {
            if doc == TERMINATED {
                return Ok(TERMINATED);
            }
            if self.up_to.is_none_or(|up_to| doc > up_to) {
                let next_target = self.advance_target(doc)?;
                if next_target != doc {
                    doc = self.scorers[0].seek(next_target)?;
                    continue;
                }
            }
            for i in 1..self.scorers.len() {
                let next = self.scorers[i].seek(doc)?;
                if next > doc {
                    doc = self.scorers[0].seek(next)?;
                    continue 'advance_head;
                }
            }
            return Ok(doc);
        }
    }
}

impl DocSet for BlockMaxConjunctionScorer<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.scorers[0].doc()
    }

    fn advance(&mut self) -> Result<DocId> {
        let doc = self.doc();
        if doc == TERMINATED {
            return Ok(TERMINATED);
        }
        self.seek(doc + 1)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if target <= self.doc() {
            return Ok(self.doc());
        }
        let target = self.advance_target(target)?;
        let doc = self.scorers[0].seek(target)?;
        self.do_next(doc)
    }

    fn cost(&self) -> u64 {
        self.scorers[0].cost()
    }

    fn match_cost(&self) -> Option<f32> {
        self.match_cost
    }

    fn matches(&mut self) -> Result<bool> {
        for &i in &self.two_phase {
            if !self.scorers[i].matches()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Scorer for BlockMaxConjunctionScorer<'_> {
    fn score(&mut self) -> Result<Score> {
        let mut sum = 0.0f64;
        for scorer in &mut self.scorers {
            sum += f64::from(scorer.score()?);
        }
        Ok(sum as Score)
    }

    /// Block boundaries are the lead's; the other clauses are only moved along.
    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        for scorer in &mut self.scorers[1..] {
            scorer.advance_shallow(target)?;
        }
        self.scorers[0].advance_shallow(target)
    }

    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        self.propagator.max_score(&mut self.scorers, up_to)
    }

    fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
        self.min_score = min_score;
        self.propagator
            .set_min_competitive_score(&mut self.scorers, min_score)
    }
}
