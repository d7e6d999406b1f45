//! Weak AND: disjunction with dynamic pruning
//!
//! Clauses live in one of three sets:
//!
//! - `lead`: clauses positioned on the current doc,
//! - `head`: clauses positioned after the current doc, in a min-heap by doc,
//! - `tail`: clauses behind the current doc, in a heap that advances the
//!   cheapest clause first. The tail alone can never produce a competitive
//!   match: either its max scores sum below the minimum competitive score or it
//!   holds fewer clauses than `min_should_match`.
//!
//! Max scores are compared as scaled integers so that sums are exact. Each
//! max score is rounded up and the minimum competitive score is rounded down,
//! which keeps every bound on the safe side.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::max_score::MaxScoreSumPropagator;
use super::traits::{ScoreMode, Scorer};
use super::two_phase;

/// Scaled max scores fit in the 24 bits of a float mantissa.
const MAX_SCALED_SCORE: u64 = (1 << 24) - 1;

/// Unbiased binary exponent of a positive, finite `f`.
fn exponent(f: f64) -> i32 {
    (((f.to_bits() >> 52) & 0x7ff) as i32) - 1023
}

/// `x * 2^n`, exact for the exponents scores produce.
fn scalb(x: f64, n: i32) -> f64 {
    let n = n.clamp(-1022, 1023);
    x * f64::from_bits(((n + 1023) as u64) << 52)
}

/// Factor that brings `f` into `[2^23, 2^24)` once scaled.
fn scaling_factor(f: Score) -> i32 {
    if f == 0.0 {
        scaling_factor(f32::MIN_POSITIVE) + 1
    } else if f.is_infinite() {
        scaling_factor(f32::MAX) - 1
    } else {
        23 - exponent(f64::from(f))
    }
}

/// Round up: a scaled max score never under-estimates.
fn scale_max_score(max_score: Score, scaling_factor: i32) -> u64 {
    let scaled = scalb(f64::from(max_score), scaling_factor);
    if scaled > MAX_SCALED_SCORE as f64 {
        return MAX_SCALED_SCORE;
    }
    scaled.ceil() as u64
}

/// Round down: a scaled minimum never over-estimates.
fn scale_min_score(min_score: Score, scaling_factor: i32) -> u64 {
    scalb(f64::from(min_score), scaling_factor).floor() as u64
}

/// Estimated matches of a disjunction that requires `min_should_match` of
/// the clauses: the sum of the `n - min_should_match + 1` cheapest costs.
pub(crate) fn cost_with_min_should_match(
    costs: impl IntoIterator<Item = u64>,
    min_should_match: usize,
) -> u64 {
    let mut costs: Vec<u64> = costs.into_iter().collect();
    costs.sort_unstable();
    let keep = (costs.len() + 1).saturating_sub(min_should_match.max(1));
    costs
        .iter()
        .take(keep)
        .fold(0u64, |acc, &c| acc.saturating_add(c))
}

pub struct WandScorer<'a> {
    /// Exact clause scorers.
    scorers: Vec<Box<dyn Scorer + 'a>>,
    /// Scaled max score per clause, over the current window only.
    max_scores: Vec<u64>,
    costs: Vec<u64>,
    scaling_factor: i32,
    score_mode: ScoreMode,
    min_should_match: usize,
    propagator: MaxScoreSumPropagator,

    doc: DocId,
    lead: Vec<usize>,
    lead_max_score: u64,
    head: BinaryHeap<Reverse<(DocId, usize)>>,
    tail: Vec<usize>,
    tail_max_score: u64,

    min_competitive_score: u64,
    /// Inclusive end of the window `max_scores` are valid for.
    up_to: Option<DocId>,
    cost: u64,
}

impl<'a> WandScorer<'a> {
    /// `min_should_match` must be lower than the number of clauses.
    pub fn new(
        scorers: Vec<Box<dyn Scorer + 'a>>,
        min_should_match: usize,
        score_mode: ScoreMode,
    ) -> Result<Self> {
        if min_should_match >= scorers.len() {
            return Err(crate::Error::MinShouldMatch {
                min_should_match,
                should_count: scorers.len(),
            });
        }
        let mut scorers = scorers
            .into_iter()
            .map(two_phase::confirmed)
            .collect::<Result<Vec<_>>>()?;

        let mut scaling = None;
        let mut global_max = Vec::with_capacity(scorers.len());
        if score_mode == ScoreMode::TopScores {
            for scorer in &mut scorers {
                scorer.advance_shallow(0)?;
                let max_score = scorer.max_score(TERMINATED)?;
                // 0 and infinity tell nothing about the scale
                if max_score != 0.0 && max_score.is_finite() {
                    let factor = scaling_factor(max_score);
                    scaling = Some(scaling.map_or(factor, |s: i32| s.min(factor)));
                }
                global_max.push(max_score);
            }
        }
        let scaling_factor = scaling.unwrap_or(0);
        let max_scores = if score_mode == ScoreMode::TopScores {
            global_max
                .iter()
                .map(|&m| scale_max_score(m, scaling_factor))
                .collect()
        } else {
            vec![0; scorers.len()]
        };

        let costs: Vec<u64> = scorers.iter().map(|s| s.cost()).collect();
        let cost = cost_with_min_should_match(costs.iter().copied(), min_should_match);
        let propagator = MaxScoreSumPropagator::new(&mut scorers)?;

        let mut wand = Self {
            lead: (0..scorers.len()).collect(),
            lead_max_score: max_scores.iter().sum(),
            scorers,
            max_scores,
            costs,
            scaling_factor,
            score_mode,
            min_should_match,
            propagator,
            doc: 0,
            head: BinaryHeap::new(),
            tail: Vec::new(),
            tail_max_score: 0,
            min_competitive_score: 0,
            up_to: None,
            cost,
        };
        wand.seek_internal(0)?;
        Ok(wand)
    }

    // ── tail heap ───────────────────────────────────────────────────────

    /// Tail order: the cheapest clause is advanced first, ties go to the
    /// higher max score.
    fn advances_first(&self, a: usize, b: usize) -> bool {
        self.costs[a] < self.costs[b]
            || (self.costs[a] == self.costs[b] && self.max_scores[a] > self.max_scores[b])
    }

    fn greater_max_score(&self, a: usize, b: usize) -> bool {
        self.max_scores[a] > self.max_scores[b]
            || (self.max_scores[a] == self.max_scores[b] && self.costs[a] < self.costs[b])
    }

    fn tail_sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.advances_first(self.tail[pos], self.tail[parent]) {
                break;
            }
            self.tail.swap(pos, parent);
            pos = parent;
        }
    }

    fn tail_sift_down(&mut self, mut pos: usize) {
        let len = self.tail.len();
        loop {
            let mut best = pos;
            for child in [2 * pos + 1, 2 * pos + 2] {
                if child < len && self.advances_first(self.tail[child], self.tail[best]) {
                    best = child;
                }
            }
            if best == pos {
                return;
            }
            self.tail.swap(pos, best);
            pos = best;
        }
    }

    fn add_tail(&mut self, i: usize) {
        self.tail.push(i);
        self.tail_max_score += self.max_scores[i];
        let last = self.tail.len() - 1;
        self.tail_sift_up(last);
    }

    fn pop_tail(&mut self) -> Option<usize> {
        if self.tail.is_empty() {
            return None;
        }
        let top = self.tail.swap_remove(0);
        self.tail_sift_down(0);
        self.tail_max_score -= self.max_scores[top];
        Some(top)
    }

    /// Add `i` to the tail if the tail stays non-competitive, otherwise return
    /// the clause that must be advanced instead: `i` itself, or a tail clause
    /// it replaces.
    fn insert_tail_with_overflow(&mut self, i: usize) -> Option<usize> {
        if self.tail_max_score + self.max_scores[i] < self.min_competitive_score
            || self.tail.len() + 1 < self.min_should_match
        {
            self.add_tail(i);
            return None;
        }
        let Some(&top) = self.tail.first() else {
            return Some(i);
        };
        // swapping for a clause with a lower max score keeps the tail
        // non-competitive
        if !self.greater_max_score(top, i) {
            return Some(i);
        }
        self.tail[0] = i;
        self.tail_sift_down(0);
        self.tail_max_score = self.tail_max_score - self.max_scores[top] + self.max_scores[i];
        Some(top)
    }

    // ── moves ───────────────────────────────────────────────────────────

    fn add_lead(&mut self, i: usize) {
        self.lead.push(i);
        self.lead_max_score += self.max_scores[i];
    }

    /// Advance clause `i` to `target` and park it in the head.
    fn advance_to_head(&mut self, i: usize, target: DocId) -> Result<()> {
        let doc = self.scorers[i].seek(target)?;
        if doc != TERMINATED {
            self.head.push(Reverse((doc, i)));
        }
        Ok(())
    }

    /// Move the leads back to the tail, or to the head at `target` when the
    /// tail has no room.
    fn push_back_leads(&mut self, target: DocId) -> Result<()> {
        let leads = std::mem::take(&mut self.lead);
        self.lead_max_score = 0;
        for i in leads {
            if let Some(evicted) = self.insert_tail_with_overflow(i) {
                self.advance_to_head(evicted, target)?;
            }
        }
        Ok(())
    }

    /// Make sure every head clause is at or after `target`.
    fn advance_head(&mut self, target: DocId) -> Result<()> {
        while let Some(&Reverse((doc, i))) = self.head.peek()
            && doc < target
        {
            self.head.pop();
            if let Some(evicted) = self.insert_tail_with_overflow(i) {
                self.advance_to_head(evicted, target)?;
            }
        }
        Ok(())
    }

    /// Advance the cheapest tail clause to the current doc.
    fn advance_tail(&mut self) -> Result<()> {
        let Some(i) = self.pop_tail() else {
            return Ok(());
        };
        let doc = self.scorers[i].seek(self.doc)?;
        if doc == self.doc {
            self.add_lead(i);
        } else if doc != TERMINATED {
            self.head.push(Reverse((doc, i)));
        }
        Ok(())
    }

    /// Recompute max scores for a new window starting at `target`.
    fn update_max_scores(&mut self, target: DocId) -> Result<()> {
        let mut up_to = TERMINATED;
        // head clauses act as leads: the window ends at their nearest boundary
        let head: Vec<(DocId, usize)> = self.head.iter().map(|Reverse(e)| *e).collect();
        for &(doc, i) in &head {
            if doc <= up_to {
                up_to = up_to.min(self.scorers[i].advance_shallow(doc)?);
            }
        }
        if head.is_empty() {
            // no head to follow: use the tail clause that weighs the most
            let heaviest = self
                .tail
                .iter()
                .copied()
                .max_by_key(|&i| self.max_scores[i]);
            if let Some(i) = heaviest {
                up_to = up_to.min(self.scorers[i].advance_shallow(target)?);
            }
        }
        self.up_to = Some(up_to);

        for &(doc, i) in &head {
            if doc <= up_to {
                let max_score = self.scorers[i].max_score(up_to)?;
                self.max_scores[i] = scale_max_score(max_score, self.scaling_factor);
            }
        }

        self.tail_max_score = 0;
        for k in 0..self.tail.len() {
            let i = self.tail[k];
            self.scorers[i].advance_shallow(target)?;
            let max_score = self.scorers[i].max_score(up_to)?;
            self.max_scores[i] = scale_max_score(max_score, self.scaling_factor);
            self.tail_max_score += self.max_scores[i];
        }
        for pos in (0..self.tail.len() / 2).rev() {
            self.tail_sift_down(pos);
        }

        // the tail alone must not be able to reach a competitive score
        while !self.tail.is_empty() && self.tail_max_score >= self.min_competitive_score {
            if let Some(i) = self.pop_tail() {
                self.advance_to_head(i, target)?;
            }
        }
        Ok(())
    }

    fn update_max_scores_if_necessary(&mut self, mut target: DocId) -> Result<()> {
        while self.up_to != Some(TERMINATED) {
            match self.head.peek() {
                None => {
                    // everything fits in the tail: move window by window
                    if let Some(up_to) = self.up_to {
                        target = target.max(up_to + 1);
                    }
                    self.update_max_scores(target)?;
                }
                Some(&Reverse((doc, _))) if self.up_to.is_none_or(|up_to| doc > up_to) => {
                    self.update_max_scores(target)?;
                    break;
                }
                Some(_) => break,
            }
        }
        Ok(())
    }

    /// Pop the next candidate out of the head. Leads must be empty.
    fn move_to_next_candidate(&mut self, target: DocId) -> Result<()> {
        if self.score_mode == ScoreMode::TopScores {
            self.update_max_scores_if_necessary(target)?;
        }
        let Some(Reverse((doc, i))) = self.head.pop() else {
            self.doc = TERMINATED;
            return Ok(());
        };
        self.doc = doc;
        self.add_lead(i);
        while let Some(&Reverse((d, i))) = self.head.peek()
            && d == doc
        {
            self.head.pop();
            self.add_lead(i);
        }
        Ok(())
    }

    /// Skip candidates that cannot match even with the whole tail.
    fn do_next_competitive_candidate(&mut self) -> Result<DocId> {
        while self.doc != TERMINATED
            && (self.lead_max_score + self.tail_max_score < self.min_competitive_score
                || self.lead.len() + self.tail.len() < self.min_should_match)
        {
            let next = self.doc + 1;
            self.push_back_leads(next)?;
            self.move_to_next_candidate(next)?;
        }
        Ok(self.doc)
    }

    fn seek_internal(&mut self, target: DocId) -> Result<DocId> {
        self.push_back_leads(target)?;
        self.advance_head(target)?;
        self.move_to_next_candidate(target)?;
        self.do_next_competitive_candidate()
    }
}

impl DocSet for WandScorer<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.doc
    }

    fn advance(&mut self) -> Result<DocId> {
        if self.doc == TERMINATED {
            return Ok(TERMINATED);
        }
        self.seek_internal(self.doc + 1)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if target <= self.doc {
            return Ok(self.doc);
        }
        self.seek_internal(target)
    }

    fn cost(&self) -> u64 {
        self.cost
    }

    fn match_cost(&self) -> Option<f32> {
        Some(self.scorers.len() as f32)
    }

    fn matches(&mut self) -> Result<bool> {
        while self.lead_max_score < self.min_competitive_score
            || self.lead.len() < self.min_should_match
        {
            if self.lead_max_score + self.tail_max_score < self.min_competitive_score
                || self.lead.len() + self.tail.len() < self.min_should_match
            {
                return Ok(false);
            }
            self.advance_tail()?;
        }
        Ok(true)
    }
}

impl Scorer for WandScorer<'_> {
    fn score(&mut self) -> Result<Score> {
        // every clause on the doc counts towards the score
        while !self.tail.is_empty() {
            self.advance_tail()?;
        }
        let mut sum = 0.0f64;
        for &i in &self.lead {
            sum += f64::from(self.scorers[i].score()?);
        }
        Ok(sum as Score)
    }

    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        self.propagator.advance_shallow(&mut self.scorers, target)?;
        match self.up_to {
            Some(up_to) if target <= up_to => Ok(up_to),
            _ => Ok(TERMINATED),
        }
    }

    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        self.propagator.max_score(&mut self.scorers, up_to)
    }

    fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
        if self.score_mode != ScoreMode::TopScores {
            return Ok(());
        }
        let scaled = scale_min_score(min_score, self.scaling_factor);
        self.min_competitive_score = self.min_competitive_score.max(scaled);
        self.propagator
            .set_min_competitive_score(&mut self.scorers, min_score)
    }
}
