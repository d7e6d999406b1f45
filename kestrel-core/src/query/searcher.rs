//! Multi-segment search
//!
//! Segments are swept concurrently on a rayon pool, each with its own scorer
//! tree and collector. The sweeps share the hit count and the competitive
//! score, so a strong segment raises the threshold of every other one.

use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::structures::MemorySegment;
use crate::{Error, Result, SearchConfig};

use super::accumulator::{HitsThresholdChecker, MaxScoreAccumulator};
use super::collector::{CountCollector, TopDocs, TopKCollector, collect_segment};
use super::stats::CollectionStats;
use super::traits::{Query, ScoreMode, SearchContext, Weight};

/// Searches a fixed set of segments.
pub struct Searcher {
    segments: Vec<Arc<MemorySegment>>,
    stats: CollectionStats,
    config: SearchConfig,
    /// Dedicated pool; rayon's global pool when `None`.
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl Searcher {
    pub fn new(segments: Vec<Arc<MemorySegment>>, config: SearchConfig) -> Self {
        let stats = CollectionStats::new(segments.clone());
        Self {
            segments,
            stats,
            config,
            thread_pool: None,
        }
    }

    /// Sweep segments on a dedicated pool of `num_threads` threads.
    pub fn with_num_threads(mut self, num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        self.thread_pool = Some(Arc::new(pool));
        Ok(self)
    }

    pub fn segments(&self) -> &[Arc<MemorySegment>] {
        &self.segments
    }

    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Compile `query` against this searcher's collection statistics.
    pub fn weight(&self, query: &dyn Query, score_mode: ScoreMode) -> Result<Box<dyn Weight>> {
        let ctx = SearchContext {
            score_mode,
            stats: &self.stats,
            config: &self.config,
        };
        query.weight(&ctx)
    }

    fn run<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.thread_pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Best `k` hits, pruning non-competitive docs.
    pub fn search(&self, query: &dyn Query, k: usize) -> Result<TopDocs> {
        let weight = self.weight(query, ScoreMode::TopScores)?;
        let hits_checker = Arc::new(HitsThresholdChecker::new(
            self.config.total_hits_threshold,
        ));
        let accumulator = Arc::new(MaxScoreAccumulator::new());

        let parts = self.run(|| {
            self.segments
                .par_iter()
                .map(|segment| {
                    let mut collector = TopKCollector::with_config(k, &self.config)
                        .with_shared(Arc::clone(&hits_checker), Arc::clone(&accumulator));
                    collect_segment(weight.as_ref(), segment, &mut collector)?;
                    Ok(collector.into_top_docs())
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let top = TopDocs::merge(k, parts);
        debug!(
            "search {}: segments={}, hits={}, total_hits={} ({:?})",
            query,
            self.segments.len(),
            top.hits.len(),
            top.total_hits,
            top.relation
        );
        Ok(top)
    }

    /// Best `k` hits, scoring every match.
    pub fn search_exhaustive(&self, query: &dyn Query, k: usize) -> Result<TopDocs> {
        let weight = self.weight(query, ScoreMode::Complete)?;
        let parts = self.run(|| {
            self.segments
                .par_iter()
                .map(|segment| {
                    let mut collector = TopKCollector::exhaustive(k);
                    collect_segment(weight.as_ref(), segment, &mut collector)?;
                    Ok(collector.into_top_docs())
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(TopDocs::merge(k, parts))
    }

    /// Number of docs matching `query`.
    pub fn count(&self, query: &dyn Query) -> Result<u64> {
        let weight = self.weight(query, ScoreMode::CompleteNoScores)?;
        self.run(|| {
            self.segments
                .par_iter()
                .map(|segment| {
                    let mut collector = CountCollector::new();
                    collect_segment(weight.as_ref(), segment, &mut collector)?;
                    Ok(collector.count())
                })
                .sum::<Result<u64>>()
        })
    }
}
