//! Required clause plus optional clause
//!
//! Matches the required clause, adding the optional clause's score where both
//! match. Under [`ScoreMode::TopScores`] the optional clause turns required
//! as soon as the required clause alone can no longer reach the minimum
//! competitive score, either globally or within the current block.

use log::trace;

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::traits::{ScoreMode, Scorer};
use super::two_phase;

pub struct ReqOptSumScorer<'a> {
    req: Box<dyn Scorer + 'a>,
    /// Always exact.
    opt: Box<dyn Scorer + 'a>,
    score_mode: ScoreMode,
    min_score: Score,
    /// Max score of the required clause over the whole segment.
    req_max_score: Score,
    /// Inclusive end of the current block, `None` before the first one.
    up_to: Option<DocId>,
    req_block_max_score: Score,
    block_max_score: Score,
    opt_is_required: bool,
}

impl<'a> ReqOptSumScorer<'a> {
    pub fn new(
        mut req: Box<dyn Scorer + 'a>,
        opt: Box<dyn Scorer + 'a>,
        score_mode: ScoreMode,
    ) -> Result<Self> {
        let mut opt = two_phase::confirmed(opt)?;
        let req_max_score = if score_mode == ScoreMode::TopScores {
            req.advance_shallow(0)?;
            opt.advance_shallow(0)?;
            req.max_score(TERMINATED)?
        } else {
            Score::INFINITY
        };
        Ok(Self {
            req,
            opt,
            score_mode,
            min_score: 0.0,
            req_max_score,
            up_to: None,
            req_block_max_score: Score::INFINITY,
            block_max_score: Score::INFINITY,
            opt_is_required: false,
        })
    }

    fn move_to_next_block(&mut self, target: DocId) -> Result<()> {
        let up_to = self.advance_shallow(target)?;
        self.up_to = Some(up_to);
        self.req_block_max_score = self.req.max_score(up_to)?;
        self.block_max_score = self.max_score(up_to)?;
        // the optional clause must match in blocks where the required one
        // cannot compete alone
        self.opt_is_required = self.req_block_max_score < self.min_score;
        Ok(())
    }

    /// First doc at or after `target` in a block that may hold competitive docs.
    fn advance_impacts(&mut self, mut target: DocId) -> Result<DocId> {
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

    fn advance_internal(&mut self, target: DocId) -> Result<DocId> {
        if target == TERMINATED {
            return self.req.seek(TERMINATED);
        }
        let mut req_doc = target;
        'advance_head: loop {
            if self.min_score != 0.0 {
                req_doc = self.advance_impacts(req_doc)?;
            }
            req_doc = self.req.seek(req_doc)?;
            if req_doc == TERMINATED || !self.opt_is_required {
                return Ok(req_doc);
            }

            let upper_bound = if self.req_max_score < self.min_score {
                TERMINATED
            } else {
                self.up_to.unwrap_or(TERMINATED)
            };
            if req_doc > upper_bound {
                continue;
            }

            // leapfrog with the optional clause inside the current block
            loop {
                let mut opt_doc = self.opt.doc();
                if opt_doc < req_doc {
                    opt_doc = self.opt.seek(req_doc)?;
                }
                if opt_doc > upper_bound {
                    if upper_bound == TERMINATED {
                        return self.req.seek(TERMINATED);
                    }
                    req_doc = upper_bound + 1;
                    continue 'advance_head;
                }
                if opt_doc != req_doc {
                    req_doc = self.req.seek(opt_doc)?;
                    if req_doc > upper_bound {
                        continue 'advance_head;
                    }
                }
                if req_doc == TERMINATED || opt_doc == req_doc {
                    return Ok(req_doc);
                }
            }
        }
    }
}

impl DocSet for ReqOptSumScorer<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.req.doc()
    }

    fn advance(&mut self) -> Result<DocId> {
        let doc = self.req.doc();
        if doc == TERMINATED {
            return Ok(TERMINATED);
        }
        if self.score_mode != ScoreMode::TopScores {
            return self.req.advance();
        }
        self.advance_internal(doc + 1)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.req.doc();
        if target <= doc {
            return Ok(doc);
        }
        if self.score_mode != ScoreMode::TopScores {
            return self.req.seek(target);
        }
        self.advance_internal(target)
    }

    fn cost(&self) -> u64 {
        self.req.cost()
    }

    fn match_cost(&self) -> Option<f32> {
        self.req.match_cost()
    }

    fn matches(&mut self) -> Result<bool> {
        self.req.matches()
    }
}

impl Scorer for ReqOptSumScorer<'_> {
    fn score(&mut self) -> Result<Score> {
        let doc = self.req.doc();
        let mut score = self.req.score()?;
        let mut opt_doc = self.opt.doc();
        if opt_doc < doc {
            opt_doc = self.opt.seek(doc)?;
        }
        if opt_doc == doc {
            score += self.opt.score()?;
        }
        Ok(score)
    }

    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        let mut up_to = self.req.advance_shallow(target)?;
        let opt_doc = self.opt.doc();
        if opt_doc <= target {
            up_to = up_to.min(self.opt.advance_shallow(target)?);
        } else if opt_doc != TERMINATED {
            // bounds change once the optional clause comes in
            up_to = up_to.min(opt_doc - 1);
        }
        Ok(up_to)
    }

    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        let mut max_score = self.req.max_score(up_to)?;
        if self.opt.doc() <= up_to {
            max_score += self.opt.max_score(up_to)?;
        }
        Ok(max_score)
    }

    fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
        if self.score_mode != ScoreMode::TopScores {
            return Ok(());
        }
        self.min_score = min_score;
        if self.req_max_score < min_score {
            trace!(
                "optional clause now required: req max {} < min {}",
                self.req_max_score, min_score
            );
            self.opt_is_required = true;
            if self.req_max_score == 0.0 {
                self.opt.set_min_competitive_score(min_score)?;
            }
        } else if self.up_to.is_some() && self.req_block_max_score < min_score {
            self.opt_is_required = true;
        }
        Ok(())
    }
}
