//! Error types for kestrel

use std::io;

use crate::query::Occur;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Postings corruption: {0}")]
    Corruption(String),

    #[error("Invalid clause combination: {reason} ({occur:?} clause #{index})")]
    InvalidClauses {
        occur: Occur,
        index: usize,
        reason: String,
    },

    #[error("minimum_should_match={min_should_match} out of range for {should_count} SHOULD clauses")]
    MinShouldMatch {
        min_should_match: usize,
        should_count: usize,
    },

    #[error("Boolean query needs at least one MUST, FILTER or SHOULD clause")]
    NoPositiveClause,

    #[error("Too many clauses: {count} > max_clause_count={max}")]
    TooManyClauses { count: usize, max: usize },

    #[error("Query error: {0}")]
    Query(String),
}

pub type Result<T> = std::result::Result<T, Error>;
