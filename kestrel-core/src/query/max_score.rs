//! Max score bookkeeping for sums of scorers
//!
//! A sum scorer (block-max conjunction, WAND) bounds its score by the sum of its
//! clauses' max scores, and turns its own minimum competitive score into a
//! minimum for every clause: the smallest score a clause must contribute when
//! every other clause scores its maximum.

use crate::{DocId, Result, Score};

use super::docset::TERMINATED;
use super::traits::Scorer;

/// Bound on the relative error of summing `num_values` doubles in any order.
pub fn sum_relative_error_bound(num_values: usize) -> f64 {
    if num_values <= 1 {
        return 0.0;
    }
    // u = unit roundoff of f64
    let u = f64::EPSILON / 2.0;
    let n = (num_values - 1) as f64;
    n * u / (1.0 - n * u)
}

/// Upper bound of a sum of `num_values` doubles, whatever the order they are
/// added in.
pub fn sum_upper_bound(sum: f64, num_values: usize) -> f64 {
    if num_values <= 2 {
        // two values always add up the same
        return sum;
    }
    (1.0 + 2.0 * sum_relative_error_bound(num_values)) * sum
}

/// Unit in the last place of `x`.
fn ulp(x: f32) -> f32 {
    let x = x.abs();
    if x == f32::MAX {
        x - x.next_down()
    } else {
        x.next_up() - x
    }
}

/// Keeps clauses ordered by decreasing max score, with the sum of the max
/// scores of every other clause precomputed.
///
/// The propagator does not own the scorers: it holds indices into the slice
/// owned by the parent scorer, which passes it back on every call.
#[derive(Debug, Clone)]
pub struct MaxScoreSumPropagator {
    /// Clause indices by decreasing max score.
    order: Vec<usize>,
    /// `sum_of_others[i]`: sum of max scores of every clause but `order[i]`.
    sum_of_others: Vec<Score>,
}

impl MaxScoreSumPropagator {
    pub fn new<S: Scorer>(scorers: &mut [S]) -> Result<Self> {
        let mut max_scores = Vec::with_capacity(scorers.len());
        for scorer in scorers.iter_mut() {
            scorer.advance_shallow(0)?;
            max_scores.push(scorer.max_score(TERMINATED)?);
        }

        let mut order: Vec<usize> = (0..scorers.len()).collect();
        order.sort_by(|&a, &b| max_scores[b].total_cmp(&max_scores[a]));
        let sorted: Vec<Score> = order.iter().map(|&i| max_scores[i]).collect();

        Ok(Self {
            sum_of_others: Self::sum_of_complement(&sorted),
            order,
        })
    }

    fn sum_of_complement(scores: &[Score]) -> Vec<Score> {
        let n = scores.len();
        let mut prefix = vec![0.0f64; n + 1];
        for i in 0..n {
            prefix[i + 1] = prefix[i] + f64::from(scores[i]);
        }
        let mut suffix = vec![0.0f64; n + 1];
        for i in (0..n).rev() {
            suffix[i] = suffix[i + 1] + f64::from(scores[i]);
        }
        // not exact, but being slightly off only makes clauses skip less
        (0..n)
            .map(|i| sum_upper_bound(prefix[i] + suffix[i + 1], n) as Score)
            .collect()
    }

    pub fn num_clauses(&self) -> usize {
        self.order.len()
    }

    /// Float upper bound of a sum over every clause.
    pub fn score_sum_upper_bound(&self, sum: f64) -> Score {
        sum_upper_bound(sum, self.order.len()) as Score
    }

    /// Shallow-advance every clause that is behind `target`.
    pub fn advance_shallow<S: Scorer>(&self, scorers: &mut [S], target: DocId) -> Result<()> {
        for scorer in scorers.iter_mut() {
            if scorer.doc() < target {
                scorer.advance_shallow(target)?;
            }
        }
        Ok(())
    }

    /// Upper bound of the sum of scores of clauses that may match up to `up_to`.
    pub fn max_score<S: Scorer>(&self, scorers: &mut [S], up_to: DocId) -> Result<Score> {
        let mut max_score = 0.0f64;
        for scorer in scorers.iter_mut() {
            if scorer.doc() <= up_to {
                max_score += f64::from(scorer.max_score(up_to)?);
            }
        }
        Ok(self.score_sum_upper_bound(max_score))
    }

    /// Push per-clause minimum scores derived from the sum's minimum.
    pub fn set_min_competitive_score<S: Scorer>(
        &self,
        scorers: &mut [S],
        min_score: Score,
    ) -> Result<()> {
        if min_score == 0.0 {
            return Ok(());
        }
        // a double just below `min_score` may still round up to it as a float
        let min_score_down = min_score.next_down();
        for (pos, &clause) in self.order.iter().enumerate() {
            let clause_min = self.min_competitive_score(min_score_down, self.sum_of_others[pos]);
            if clause_min <= 0.0 {
                // clauses are by decreasing max score, the rest get 0 too
                break;
            }
            scorers[clause].set_min_competitive_score(clause_min)?;
        }
        Ok(())
    }

    /// Largest score a clause may contribute while `score + sum_of_others` still
    /// stays below `min_score_sum`, found by tightening from the exact difference.
    fn min_competitive_score(&self, min_score_sum: Score, sum_of_others: Score) -> Score {
        if min_score_sum <= sum_of_others {
            return 0.0;
        }
        let mut min_score = (f64::from(min_score_sum) - f64::from(sum_of_others)) as Score;
        let mut iter = 0;
        while min_score > 0.0
            && self.score_sum_upper_bound(f64::from(min_score) + f64::from(sum_of_others))
                > min_score_sum
        {
            // one step for the subtraction rounding, one for the sum bound
            min_score = (min_score - ulp(min_score_sum)).max(0.0);
            iter += 1;
            debug_assert!(iter <= 2, "min competitive score did not converge");
        }
        min_score.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::docset::DocSet;
    use crate::query::scored_docs::ScoredDocsScorer;

    fn clause(max: Score) -> ScoredDocsScorer {
        ScoredDocsScorer::new(vec![(1, max / 2.0), (5, max)])
    }

    /// Records the minimum competitive scores it receives.
    struct Recording {
        inner: ScoredDocsScorer,
        mins: Vec<Score>,
    }

    impl DocSet for Recording {
        fn doc(&self) -> DocId {
            self.inner.doc()
        }
        fn advance(&mut self) -> Result<DocId> {
            self.inner.advance()
        }
        fn cost(&self) -> u64 {
            self.inner.cost()
        }
    }

    impl Scorer for Recording {
        fn score(&mut self) -> Result<Score> {
            self.inner.score()
        }
        fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
            self.inner.advance_shallow(target)
        }
        fn max_score(&mut self, up_to: DocId) -> Result<Score> {
            self.inner.max_score(up_to)
        }
        fn set_min_competitive_score(&mut self, min_score: Score) -> Result<()> {
            self.mins.push(min_score);
            Ok(())
        }
    }

    #[test]
    fn test_sum_upper_bound() {
        assert_eq!(sum_relative_error_bound(1), 0.0);
        assert_eq!(sum_upper_bound(3.0, 2), 3.0);
        assert!(sum_upper_bound(3.0, 10) > 3.0);
        assert!(sum_upper_bound(3.0, 10) < 3.0 + 1e-12);
    }

    #[test]
    fn test_max_score_sums_clauses() {
        let mut scorers = vec![clause(1.0), clause(5.0), clause(3.0)];
        let propagator = MaxScoreSumPropagator::new(&mut scorers).unwrap();
        assert_eq!(propagator.num_clauses(), 3);
        let max = propagator.max_score(&mut scorers, TERMINATED).unwrap();
        assert!(max >= 9.0 && max < 9.0001);
        // clauses positioned past up_to are left out
        scorers[1].seek(5).unwrap();
        let max = propagator.max_score(&mut scorers, 2).unwrap();
        assert!(max >= 4.0 && max < 4.0001);
    }

    #[test]
    fn test_min_competitive_scores_per_clause() {
        let mut scorers: Vec<Recording> = [5.0, 3.0, 1.0]
            .into_iter()
            .map(|max| Recording {
                inner: clause(max),
                mins: Vec::new(),
            })
            .collect();
        let propagator = MaxScoreSumPropagator::new(&mut scorers).unwrap();

        // 3 + 1 < 4.5 so the 5.0 clause must contribute; the others need not
        propagator
            .set_min_competitive_score(&mut scorers, 4.5)
            .unwrap();
        assert_eq!(scorers[0].mins.len(), 1);
        let min = scorers[0].mins[0];
        assert!(min > 0.4999 && min <= 0.5, "{}", min);
        assert!(min + 3.0 + 1.0 < 4.5);
        assert!(scorers[1].mins.is_empty());
        assert!(scorers[2].mins.is_empty());

        propagator
            .set_min_competitive_score(&mut scorers, 8.5)
            .unwrap();
        let min = *scorers[0].mins.last().unwrap();
        assert!(min > 4.4999 && min <= 4.5);
        let min = *scorers[1].mins.last().unwrap();
        assert!(min > 2.4999 && min <= 2.5);
        let min = *scorers[2].mins.last().unwrap();
        assert!(min > 0.4999 && min <= 0.5);
    }

    #[test]
    fn test_zero_threshold_is_ignored() {
        let mut scorers = vec![Recording {
            inner: clause(2.0),
            mins: Vec::new(),
        }];
        let propagator = MaxScoreSumPropagator::new(&mut scorers).unwrap();
        propagator.set_min_competitive_score(&mut scorers, 0.0).unwrap();
        assert!(scorers[0].mins.is_empty());
    }
}
