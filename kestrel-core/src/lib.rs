//! Kestrel - query execution core for full-text search
//!
//! Turns a boolean query into a tree of lazy postings cursors and drives it to
//! produce the top-k scored documents of each segment:
//! - Forward-only cursors with two-phase (approximate, then confirm) matching
//! - Leapfrog conjunctions, heap-based disjunctions, required/optional and
//!   required/excluded combinators
//! - Block-max conjunctions and WAND disjunctions fed by impact-derived block
//!   score bounds
//! - A top-k collector that pushes a rising competitive score back into the tree,
//!   shared lock-free across concurrently searched segments

pub mod config;
pub mod error;
pub mod query;
pub mod structures;

pub use config::{Bm25Params, SearchConfig};
pub use error::{Error, Result};

pub use query::{
    BooleanQuery, CollectStatus, Collector, DocSet, MaxScoreAccumulator, Occur, Query,
    ScoreMode, ScoredDoc, Scorer, ScorerSupplier, Searcher, TERMINATED, TermQuery, TopDocs,
    TopKCollector, Weight,
};
pub use structures::{MemorySegment, PostingList, SegmentBuilder};

pub type DocId = u32;
pub type TermFreq = u32;
pub type Score = f32;
