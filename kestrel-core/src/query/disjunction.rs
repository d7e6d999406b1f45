//! Disjunction (OR) of scorers
//!
//! Sub-scorers sit in a min-heap keyed by their current doc. The scorers on the
//! current doc are kept out of the heap until the next move, so scoring and
//! confirming them needs no heap traversal.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::{DocId, Result, Score};

use super::docset::{DocSet, TERMINATED};
use super::max_score::sum_upper_bound;
use super::traits::Scorer;

/// Union of sub-scorers, scoring a doc with the sum of the subs matching it.
///
/// With two-phase subs the union is two-phase too. Confirmation is lazy:
/// `matches()` stops at the first confirmed sub, and `score()` confirms the
/// rest only when scores are actually read.
pub struct DisjunctionScorer<'a> {
    subs: Vec<Box<dyn Scorer + 'a>>,
    /// Subs positioned after the current doc.
    heap: BinaryHeap<Reverse<(DocId, usize)>>,
    doc: DocId,
    /// Subs on the current doc known to match it.
    matched: Vec<usize>,
    /// Two-phase subs on the current doc, by decreasing match cost.
    pending: Vec<usize>,
    /// Two-phase subs on the current doc that failed confirmation.
    rejected: Vec<usize>,
    cost: u64,
    match_cost: Option<f32>,
}

impl<'a> DisjunctionScorer<'a> {
    pub fn new(subs: Vec<Box<dyn Scorer + 'a>>) -> Self {
        let cost = subs.iter().fold(0u64, |acc, s| acc.saturating_add(s.cost()));
        let match_cost = Self::compute_match_cost(&subs);
        let heap = subs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.doc() != TERMINATED)
            .map(|(i, s)| Reverse((s.doc(), i)))
            .collect();
        let mut disjunction = Self {
            subs,
            heap,
            doc: TERMINATED,
            matched: Vec::new(),
            pending: Vec::new(),
            rejected: Vec::new(),
            cost,
            match_cost,
        };
        disjunction.refill();
        disjunction
    }

    /// Average match cost of the subs, weighted by how often each one is
    /// expected to sit on a candidate.
    fn compute_match_cost(subs: &[Box<dyn Scorer + 'a>]) -> Option<f32> {
        if !subs.iter().any(|s| s.is_two_phase()) {
            return None;
        }
        let mut weighted = 0.0f64;
        let mut total_cost = 0.0f64;
        for sub in subs {
            let cost = sub.cost() as f64;
            weighted += f64::from(sub.match_cost().unwrap_or(0.0)) * cost;
            total_cost += cost;
        }
        if total_cost == 0.0 {
            let sum: f32 = subs.iter().filter_map(|s| s.match_cost()).sum();
            return Some(sum / subs.len() as f32);
        }
        Some((weighted / total_cost) as f32)
    }

    /// Pop every sub on the smallest doc out of the heap.
    fn refill(&mut self) {
        self.matched.clear();
        self.pending.clear();
        self.rejected.clear();
        let Some(&Reverse((doc, _))) = self.heap.peek() else {
            self.doc = TERMINATED;
            return;
        };
        self.doc = doc;
        while let Some(&Reverse((d, i))) = self.heap.peek()
            && d == doc
        {
            self.heap.pop();
            if self.subs[i].is_two_phase() {
                self.pending.push(i);
            } else {
                self.matched.push(i);
            }
        }
        let subs = &self.subs;
        self.pending.sort_by(|&a, &b| {
            let (ca, cb) = (subs[a].match_cost(), subs[b].match_cost());
            cb.unwrap_or(0.0).total_cmp(&ca.unwrap_or(0.0))
        });
    }

    fn push_back(&mut self, i: usize) {
        let doc = self.subs[i].doc();
        if doc != TERMINATED {
            self.heap.push(Reverse((doc, i)));
        }
    }

    /// Subs on the current doc, whatever their confirmation state.
    fn take_current(&mut self) -> Vec<usize> {
        let mut current = std::mem::take(&mut self.matched);
        current.append(&mut self.pending);
        current.append(&mut self.rejected);
        current
    }
}

impl DocSet for DisjunctionScorer<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.doc
    }

    fn advance(&mut self) -> Result<DocId> {
        if self.doc == TERMINATED {
            return Ok(TERMINATED);
        }
        for i in self.take_current() {
            self.subs[i].advance()?;
            self.push_back(i);
        }
        self.refill();
        Ok(self.doc)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if target <= self.doc {
            return Ok(self.doc);
        }
        for i in self.take_current() {
            self.subs[i].seek(target)?;
            self.push_back(i);
        }
        while let Some(&Reverse((d, i))) = self.heap.peek()
            && d < target
        {
            self.heap.pop();
            self.subs[i].seek(target)?;
            self.push_back(i);
        }
        self.refill();
        Ok(self.doc)
    }

    fn cost(&self) -> u64 {
        self.cost
    }

    fn match_cost(&self) -> Option<f32> {
        self.match_cost
    }

    fn matches(&mut self) -> Result<bool> {
        if !self.matched.is_empty() {
            return Ok(true);
        }
        while let Some(i) = self.pending.pop() {
            if self.subs[i].matches()? {
                self.matched.push(i);
                return Ok(true);
            }
            self.rejected.push(i);
        }
        Ok(false)
    }
}

impl Scorer for DisjunctionScorer<'_> {
    fn score(&mut self) -> Result<Score> {
        // subs left unconfirmed by `matches()`
        while let Some(i) = self.pending.pop() {
            if self.subs[i].matches()? {
                self.matched.push(i);
            } else {
                self.rejected.push(i);
            }
        }
        let mut sum = 0.0f64;
        for &i in &self.matched {
            sum += f64::from(self.subs[i].score()?);
        }
        Ok(sum as Score)
    }

    fn advance_shallow(&mut self, target: DocId) -> Result<DocId> {
        let mut up_to = TERMINATED;
        for sub in self.subs.iter_mut().filter(|s| s.doc() != TERMINATED) {
            up_to = up_to.min(sub.advance_shallow(target)?);
        }
        Ok(up_to)
    }

    fn max_score(&mut self, up_to: DocId) -> Result<Score> {
        let mut sum = 0.0f64;
        let mut count = 0;
        for sub in self.subs.iter_mut().filter(|s| s.doc() <= up_to) {
            sum += f64::from(sub.max_score(up_to)?);
            count += 1;
        }
        Ok(sum_upper_bound(sum, count) as Score)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::query::constant::ConstantScorer;
    use crate::query::docset::{SortedVecDocSet, collect_docs};
    use crate::query::scored_docs::ScoredDocsScorer;
    use crate::query::traits::ScoreMode;
    use crate::query::two_phase::TwoPhaseFilter;

    fn boxed<'a>(scorer: impl Scorer + 'a) -> Box<dyn Scorer + 'a> {
        Box::new(scorer)
    }

    fn docs(ids: &[DocId]) -> Box<dyn Scorer + 'static> {
        boxed(ConstantScorer::new(
            SortedVecDocSet::new(Arc::new(ids.to_vec())),
            1.0,
            ScoreMode::Complete,
        ))
    }

    #[test]
    fn test_union() {
        let mut union = DisjunctionScorer::new(vec![
            docs(&[1, 4, 9]),
            docs(&[2, 4, 10]),
            docs(&[]),
            docs(&[4, 9, 12]),
        ]);
        assert_eq!(union.cost(), 9);
        assert_eq!(union.match_cost(), None);
        assert_eq!(union.doc(), 1);
        assert_eq!(union.score().unwrap(), 1.0);
        assert_eq!(union.seek(3).unwrap(), 4);
        assert_eq!(union.score().unwrap(), 3.0);
        assert_eq!(union.seek(4).unwrap(), 4);
        assert_eq!(collect_docs(&mut union).unwrap(), vec![4, 9, 10, 12]);
        assert_eq!(union.advance().unwrap(), TERMINATED);
    }

    #[test]
    fn test_empty_union() {
        let mut union = DisjunctionScorer::new(vec![docs(&[]), docs(&[])]);
        assert_eq!(union.doc(), TERMINATED);
        assert_eq!(union.seek(3).unwrap(), TERMINATED);
    }

    #[test]
    fn test_scores_and_bounds() {
        let mut union = DisjunctionScorer::new(vec![
            boxed(ScoredDocsScorer::new(vec![(1, 2.0), (3, 1.5)])),
            boxed(ScoredDocsScorer::new(vec![(3, 0.5), (8, 4.0)])),
        ]);
        assert_eq!(union.score().unwrap(), 2.0);
        assert_eq!(union.max_score(2).unwrap(), 2.0);
        assert_eq!(union.max_score(TERMINATED).unwrap(), 6.0);
        assert_eq!(union.advance_shallow(0).unwrap(), TERMINATED);
        assert_eq!(union.advance().unwrap(), 3);
        assert_eq!(union.score().unwrap(), 2.0);
        assert_eq!(union.advance().unwrap(), 8);
        assert_eq!(union.max_score(TERMINATED).unwrap(), 4.0);
    }

    #[test]
    fn test_lazy_two_phase_confirmation() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (c1, c2) = (Rc::clone(&calls), Rc::clone(&calls));
        let cheap = TwoPhaseFilter::new(SortedVecDocSet::new(Arc::new(vec![1, 2, 3])), 1.0, move |d| {
            c1.borrow_mut().push(("cheap", d));
            Ok(d != 2)
        });
        let expensive =
            TwoPhaseFilter::new(SortedVecDocSet::new(Arc::new(vec![1, 2, 3])), 50.0, move |d| {
                c2.borrow_mut().push(("expensive", d));
                Ok(d != 3)
            });
        let mut union = DisjunctionScorer::new(vec![
            boxed(ConstantScorer::new(expensive, 2.0, ScoreMode::Complete)),
            boxed(ConstantScorer::new(cheap, 1.0, ScoreMode::Complete)),
        ]);
        assert!(union.is_two_phase());

        // doc 1: the cheap sub confirms, the expensive one is not consulted
        assert!(union.matches().unwrap());
        assert_eq!(*calls.borrow(), vec![("cheap", 1)]);
        // reading the score confirms the remaining sub
        assert_eq!(union.score().unwrap(), 3.0);
        assert_eq!(calls.borrow().len(), 2);

        // doc 2: the cheap sub rejects, the expensive one confirms
        union.advance().unwrap();
        assert!(union.matches().unwrap());
        assert_eq!(union.score().unwrap(), 2.0);

        // doc 3: only the cheap sub matches
        union.advance().unwrap();
        assert!(union.matches().unwrap());
        assert_eq!(union.score().unwrap(), 1.0);
    }

    #[test]
    fn test_two_phase_union_rejects_unconfirmed() {
        let odd = TwoPhaseFilter::new(SortedVecDocSet::new(Arc::new(vec![1, 2, 3, 4])), 1.0, |d| {
            Ok(d % 2 == 1)
        });
        let mut union = DisjunctionScorer::new(vec![
            boxed(ConstantScorer::filter(odd)),
            docs(&[4]),
        ]);
        assert_eq!(collect_docs(&mut union).unwrap(), vec![1, 3, 4]);
    }

    #[test]
    fn test_rejected_sub_keeps_iterating() {
        let odd = || {
            TwoPhaseFilter::new(SortedVecDocSet::new(Arc::new(vec![1, 2, 3, 5, 7])), 1.0, |d| {
                Ok(d % 2 == 1)
            })
        };

        let mut union = DisjunctionScorer::new(vec![boxed(ConstantScorer::filter(odd()))]);
        assert_eq!(collect_docs(&mut union).unwrap(), vec![1, 3, 5, 7]);

        // rejection found while scoring
        let mut union = DisjunctionScorer::new(vec![
            boxed(ConstantScorer::new(odd(), 1.0, ScoreMode::Complete)),
            docs(&[2, 6]),
        ]);
        let mut hits = Vec::new();
        let mut doc = union.doc();
        while doc != TERMINATED {
            hits.push((doc, union.score().unwrap()));
            doc = union.advance().unwrap();
        }
        assert_eq!(
            hits,
            vec![(1, 1.0), (2, 1.0), (3, 1.0), (5, 1.0), (6, 1.0), (7, 1.0)]
        );

        // rejection followed by a seek
        let mut union = DisjunctionScorer::new(vec![boxed(ConstantScorer::filter(odd()))]);
        assert_eq!(union.advance().unwrap(), 2);
        assert!(!union.matches().unwrap());
        assert_eq!(union.seek(5).unwrap(), 5);
        assert!(union.matches().unwrap());
    }
}
