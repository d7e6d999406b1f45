//! Two-phase matching adapters
//!
//! [`TwoPhaseFilter`] turns a cheap approximation and an expensive per-doc
//! predicate into a two-phase cursor. [`TwoPhaseConfirmed`] goes the other way:
//! it confirms every candidate itself so callers see exact positions only.

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::traits::Scorer;

/// Exact view of a possibly two-phase cursor.
///
/// Every move advances the approximation, then calls `matches()` until a
/// candidate confirms or the cursor is exhausted.
pub struct TwoPhaseConfirmed<S> {
    inner: S,
}

impl<S: DocSet> TwoPhaseConfirmed<S> {
    /// Confirms the inner cursor's current position, moving past it if needed.
    pub fn new(inner: S) -> Result<Self> {
        let mut confirmed = Self { inner };
        confirmed.confirm()?;
        Ok(confirmed)
    }

    fn confirm(&mut self) -> Result<DocId> {
        let mut doc = self.inner.doc();
        while doc != TERMINATED && !self.inner.matches()? {
            doc = self.inner.advance()?;
        }
        Ok(doc)
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: DocSet> DocSet for TwoPhaseConfirmed<S> {
    #[inline]
    fn doc(&self) -> DocId {
        self.inner.doc()
    }

    fn advance(&mut self) -> Result<DocId> {
        self.inner.advance()?;
        self.confirm()
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.inner.doc();
        if target <= doc {
            return Ok(doc);
        }
        self.inner.seek(target)?;
        self.confirm()
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

impl<S: Scorer> Scorer for TwoPhaseConfirmed<S> {
    #[inline]
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
        self.inner.set_min_competitive_score(min_score)
    }
}

/// Boxes `scorer`, wrapping it in [`TwoPhaseConfirmed`] when it is two-phase.
pub fn confirmed<'a>(scorer: Box<dyn Scorer + 'a>) -> Result<Box<dyn Scorer + 'a>> {
    if scorer.is_two_phase() {
        Ok(Box::new(TwoPhaseConfirmed::new(scorer)?))
    } else {
        Ok(scorer)
    }
}

/// Approximation plus per-document predicate.
///
/// `match_cost` is the expected cost of one predicate call; composite cursors
/// confirm their cheapest two-phase children first.
pub struct TwoPhaseFilter<D, F> {
    approximation: D,
    predicate: F,
    match_cost: f32,
}

impl<D, F> TwoPhaseFilter<D, F>
where
    D: DocSet,
    F: FnMut(DocId) -> Result<bool>,
{
    pub fn new(approximation: D, match_cost: f32, predicate: F) -> Self {
        Self {
            approximation,
            predicate,
            match_cost,
        }
    }
}

impl<D, F> DocSet for TwoPhaseFilter<D, F>
where
    D: DocSet,
    F: FnMut(DocId) -> Result<bool>,
{
    #[inline]
    fn doc(&self) -> DocId {
        self.approximation.doc()
    }

    #[inline]
    fn advance(&mut self) -> Result<DocId> {
        self.approximation.advance()
    }

    #[inline]
    fn seek(&mut self, target: DocId) -> Result<DocId> {
        self.approximation.seek(target)
    }

    fn cost(&self) -> u64 {
        self.approximation.cost()
    }

    fn match_cost(&self) -> Option<f32> {
        Some(self.match_cost + self.approximation.match_cost().unwrap_or(0.0))
    }

    fn matches(&mut self) -> Result<bool> {
        Ok(self.approximation.matches()? && (self.predicate)(self.approximation.doc())?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::docset::{SortedVecDocSet, collect_docs};
    use crate::Error;

    fn even_filter(docs: Vec<DocId>) -> impl DocSet {
        TwoPhaseFilter::new(SortedVecDocSet::new(Arc::new(docs)), 5.0, |doc| {
            Ok(doc % 2 == 0)
        })
    }

    #[test]
    fn test_filter_is_two_phase() {
        let mut filter = even_filter(vec![1, 2, 3, 4]);
        assert_eq!(filter.match_cost(), Some(5.0));
        assert_eq!(filter.doc(), 1);
        assert!(!filter.matches().unwrap());
        filter.advance().unwrap();
        assert!(filter.matches().unwrap());
        // candidates are unconfirmed, so draining confirms them
        let mut filter = even_filter(vec![1, 2, 3, 4, 7, 10]);
        assert_eq!(collect_docs(&mut filter).unwrap(), vec![2, 4, 10]);
    }

    #[test]
    fn test_confirmed_skips_non_matches() {
        let mut confirmed = TwoPhaseConfirmed::new(even_filter(vec![1, 3, 4, 5, 8, 9])).unwrap();
        assert!(!confirmed.is_two_phase());
        assert_eq!(confirmed.doc(), 4);
        assert_eq!(confirmed.advance().unwrap(), 8);
        assert_eq!(confirmed.seek(8).unwrap(), 8);
        assert_eq!(confirmed.seek(9).unwrap(), TERMINATED);
    }

    #[test]
    fn test_predicate_error_propagates() {
        let filter = TwoPhaseFilter::new(SortedVecDocSet::new(Arc::new(vec![1, 2])), 1.0, |doc| {
            if doc == 2 {
                Err(Error::Corruption("bad doc".to_string()))
            } else {
                Ok(true)
            }
        });
        let mut confirmed = TwoPhaseConfirmed::new(filter).unwrap();
        assert_eq!(confirmed.doc(), 1);
        assert!(matches!(confirmed.advance(), Err(Error::Corruption(_))));
    }
}
