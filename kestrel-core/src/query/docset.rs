//! DocSet trait and concrete implementations for document iteration.
//!
//! `DocSet` is the base abstraction for forward-only cursors over sorted document IDs.
//! Posting lists, filter results, and scorers all implement this trait.
//!
//! A cursor is positioned on its first document as soon as it is built, so the
//! only sentinel a caller ever observes is [`TERMINATED`]. [`CursorState`] gives
//! the same information as an enum for code that prefers to match on it.
//!
//! Cursors may be *two-phase*: when [`DocSet::match_cost`] returns `Some`, the
//! current document is only a candidate and [`DocSet::matches`] must confirm it.
//! Composite cursors intersect or union candidates first and defer confirmation.

use std::sync::Arc;

use crate::{DocId, Result};

/// Doc id returned once a cursor is exhausted. Terminal: never advances further.
pub const TERMINATED: DocId = DocId::MAX;

/// Position of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Positioned(DocId),
    Exhausted,
}

impl CursorState {
    #[inline]
    pub fn from_doc(doc: DocId) -> Self {
        if doc == TERMINATED {
            CursorState::Exhausted
        } else {
            CursorState::Positioned(doc)
        }
    }
}

// ── DocSet trait ─────────────────────────────────────────────────────────

/// Forward-only cursor over sorted document IDs.
pub trait DocSet {
    /// Current document ID, or [`TERMINATED`] if exhausted.
    fn doc(&self) -> DocId;

    /// Advance to the next document. Returns the new doc ID or [`TERMINATED`].
    fn advance(&mut self) -> Result<DocId>;

    /// Seek to the first document >= `target`. Returns doc ID or [`TERMINATED`].
    ///
    /// A target at or before the current document leaves the cursor in place.
    fn seek(&mut self, target: DocId) -> Result<DocId> {
        let mut doc = self.doc();
        while doc < target {
            doc = self.advance()?;
        }
        Ok(doc)
    }

    /// Cardinality hint: estimated number of documents this cursor may produce.
    fn cost(&self) -> u64;

    /// `Some(cost)` when this cursor is two-phase: its positions are candidates
    /// that [`matches`](DocSet::matches) must confirm. The value is the expected
    /// cost of one `matches` call, used to order confirmations cheapest-first.
    fn match_cost(&self) -> Option<f32> {
        None
    }

    /// Confirm the current candidate. Only valid on a real document, and at most
    /// once per position. Always true for exact cursors.
    fn matches(&mut self) -> Result<bool> {
        Ok(true)
    }

    #[inline]
    fn state(&self) -> CursorState {
        CursorState::from_doc(self.doc())
    }

    #[inline]
    fn is_two_phase(&self) -> bool {
        self.match_cost().is_some()
    }
}

// ── DocSet for Box<dyn DocSet> ───────────────────────────────────────────

impl DocSet for Box<dyn DocSet + '_> {
    #[inline]
    fn doc(&self) -> DocId {
        (**self).doc()
    }
    #[inline]
    fn advance(&mut self) -> Result<DocId> {
        (**self).advance()
    }
    #[inline]
    fn seek(&mut self, target: DocId) -> Result<DocId> {
        (**self).seek(target)
    }
    #[inline]
    fn cost(&self) -> u64 {
        (**self).cost()
    }
    #[inline]
    fn match_cost(&self) -> Option<f32> {
        (**self).match_cost()
    }
    #[inline]
    fn matches(&mut self) -> Result<bool> {
        (**self).matches()
    }
}

// ── SortedVecDocSet ──────────────────────────────────────────────────────

/// DocSet backed by a sorted `Vec<u32>`. Binary search for seek.
pub struct SortedVecDocSet {
    docs: Arc<Vec<DocId>>,
    pos: usize,
}

impl SortedVecDocSet {
    pub fn new(docs: Arc<Vec<DocId>>) -> Self {
        debug_assert!(docs.windows(2).all(|w| w[0] < w[1]));
        Self { docs, pos: 0 }
    }
}

impl DocSet for SortedVecDocSet {
    #[inline]
    fn doc(&self) -> DocId {
        self.docs.get(self.pos).copied().unwrap_or(TERMINATED)
    }

    #[inline]
    fn advance(&mut self) -> Result<DocId> {
        if self.pos < self.docs.len() {
            self.pos += 1;
        }
        Ok(self.doc())
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.pos >= self.docs.len() {
            return Ok(TERMINATED);
        }
        let remaining = &self.docs[self.pos..];
        let offset = match remaining.binary_search(&target) {
            Ok(offset) | Err(offset) => offset,
        };
        self.pos += offset;
        Ok(self.doc())
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

/// Drain a cursor into a vector of confirmed doc ids.
///
/// Two-phase cursors are confirmed with `matches()` before a doc is kept.
pub fn collect_docs<D: DocSet + ?Sized>(docset: &mut D) -> Result<Vec<DocId>> {
    let mut docs = Vec::new();
    let mut doc = docset.doc();
    while doc != TERMINATED {
        if docset.matches()? {
            docs.push(doc);
        }
        doc = docset.advance()?;
    }
    Ok(docs)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_vec_docset_basic() {
        let docs = Arc::new(vec![1, 3, 5, 7, 9]);
        let mut ds = SortedVecDocSet::new(docs);

        assert_eq!(ds.doc(), 1);
        assert_eq!(ds.advance().unwrap(), 3);
        assert_eq!(ds.advance().unwrap(), 5);
        assert_eq!(ds.seek(7).unwrap(), 7);
        assert_eq!(ds.advance().unwrap(), 9);
        assert_eq!(ds.advance().unwrap(), TERMINATED);
        assert_eq!(ds.doc(), TERMINATED);
        assert_eq!(ds.state(), CursorState::Exhausted);
    }

    #[test]
    fn test_sorted_vec_docset_seek_past() {
        let docs = Arc::new(vec![1, 5, 10, 20]);
        let mut ds = SortedVecDocSet::new(docs);

        assert_eq!(ds.seek(3).unwrap(), 5);
        assert_eq!(ds.state(), CursorState::Positioned(5));
        // seeking backwards is a no-op
        assert_eq!(ds.seek(2).unwrap(), 5);
        assert_eq!(ds.seek(15).unwrap(), 20);
        assert_eq!(ds.seek(21).unwrap(), TERMINATED);
        assert_eq!(ds.advance().unwrap(), TERMINATED);
    }

    #[test]
    fn test_sorted_vec_docset_empty() {
        let ds = SortedVecDocSet::new(Arc::new(vec![]));
        assert_eq!(ds.doc(), TERMINATED);
        assert_eq!(ds.cost(), 0);
    }

    #[test]
    fn test_default_seek_is_monotonic() {
        struct Stepper(DocId);
        impl DocSet for Stepper {
            fn doc(&self) -> DocId {
                self.0
            }
            fn advance(&mut self) -> Result<DocId> {
                self.0 = if self.0 >= 30 { TERMINATED } else { self.0 + 3 };
                Ok(self.0)
            }
            fn cost(&self) -> u64 {
                10
            }
        }

        let mut ds = Stepper(0);
        assert_eq!(ds.seek(7).unwrap(), 9);
        assert_eq!(ds.seek(9).unwrap(), 9);
        assert_eq!(ds.seek(31).unwrap(), TERMINATED);
    }

    #[test]
    fn test_collect_docs() {
        let mut ds = SortedVecDocSet::new(Arc::new(vec![2, 4, 8]));
        assert_eq!(collect_docs(&mut ds).unwrap(), vec![2, 4, 8]);
    }
}
