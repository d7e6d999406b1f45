//! Boolean query with MUST, FILTER, SHOULD and MUST_NOT clauses
//!
//! The weight simplifies the clause list per segment (missing terms, SHOULD
//! clauses that are effectively required) and hands the rest to
//! [`BooleanScorerSupplier`], which picks the scorer tree:
//!
//! - no SHOULD clause: conjunction of the required clauses,
//! - no required clause: disjunction (or WAND) of the SHOULD clauses,
//! - both, with `min_should_match > 0`: conjunction of the two sides,
//! - both, otherwise: required plus optional.
//!
//! MUST_NOT clauses are subtracted from whichever tree comes out.

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::structures::MemorySegment;
use crate::{Error, Result};

use super::block_max::BlockMaxConjunctionScorer;
use super::conjunction::ConjunctionScorer;
use super::constant::ConstantScorer;
use super::disjunction::DisjunctionScorer;
use super::req_excl::ReqExclScorer;
use super::req_opt::ReqOptSumScorer;
use super::traits::{Occur, Query, ScoreMode, Scorer, ScorerSupplier, SearchContext, Weight};
use super::wand::{WandScorer, cost_with_min_should_match};

type Supplier<'a> = Box<dyn ScorerSupplier<'a> + 'a>;

/// Boolean query
#[derive(Default, Clone)]
pub struct BooleanQuery {
    clauses: Vec<(Occur, Arc<dyn Query>)>,
    min_should_match: usize,
}

impl fmt::Debug for BooleanQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = |occur: Occur| self.clauses.iter().filter(|(o, _)| *o == occur).count();
        f.debug_struct("BooleanQuery")
            .field("must_count", &count(Occur::Must))
            .field("filter_count", &count(Occur::Filter))
            .field("should_count", &count(Occur::Should))
            .field("must_not_count", &count(Occur::MustNot))
            .field("min_should_match", &self.min_should_match)
            .finish()
    }
}

impl fmt::Display for BooleanQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Boolean(")?;
        for (i, (occur, query)) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match occur {
                Occur::Must => write!(f, "+{}", query)?,
                Occur::Filter => write!(f, "#{}", query)?,
                Occur::Should => write!(f, "{}", query)?,
                Occur::MustNot => write!(f, "-{}", query)?,
            }
        }
        write!(f, ")")?;
        if self.min_should_match > 0 {
            write!(f, "~{}", self.min_should_match)?;
        }
        Ok(())
    }
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, occur: Occur, query: Arc<dyn Query>) -> Self {
        self.clauses.push((occur, query));
        self
    }

    pub fn must(self, query: impl Query + 'static) -> Self {
        self.add(Occur::Must, Arc::new(query))
    }

    pub fn filter(self, query: impl Query + 'static) -> Self {
        self.add(Occur::Filter, Arc::new(query))
    }

    pub fn should(self, query: impl Query + 'static) -> Self {
        self.add(Occur::Should, Arc::new(query))
    }

    pub fn must_not(self, query: impl Query + 'static) -> Self {
        self.add(Occur::MustNot, Arc::new(query))
    }

    /// Minimum number of SHOULD clauses a doc must match.
    pub fn with_min_should_match(mut self, min_should_match: usize) -> Self {
        self.min_should_match = min_should_match;
        self
    }

    pub fn clauses(&self) -> &[(Occur, Arc<dyn Query>)] {
        &self.clauses
    }

    pub fn min_should_match(&self) -> usize {
        self.min_should_match
    }

    fn validate(&self, ctx: &SearchContext<'_>) -> Result<()> {
        let count = self.clause_count();
        if count > ctx.config.max_clause_count {
            return Err(Error::TooManyClauses {
                count,
                max: ctx.config.max_clause_count,
            });
        }
        if !self.clauses.iter().any(|(occur, _)| *occur != Occur::MustNot) {
            return Err(Error::NoPositiveClause);
        }
        let should_count = self
            .clauses
            .iter()
            .filter(|(occur, _)| *occur == Occur::Should)
            .count();
        if self.min_should_match > should_count {
            return Err(Error::MinShouldMatch {
                min_should_match: self.min_should_match,
                should_count,
            });
        }
        Ok(())
    }
}

impl Query for BooleanQuery {
    fn weight(&self, ctx: &SearchContext<'_>) -> Result<Box<dyn Weight>> {
        self.validate(ctx)?;
        let clauses = self
            .clauses
            .iter()
            .map(|(occur, query)| {
                // only scoring clauses see the caller's score mode
                let score_mode = if occur.is_scoring() {
                    ctx.score_mode
                } else {
                    ScoreMode::CompleteNoScores
                };
                let sub_ctx = SearchContext {
                    score_mode,
                    stats: ctx.stats,
                    config: ctx.config,
                };
                Ok((*occur, query.weight(&sub_ctx)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(BooleanWeight {
            clauses,
            min_should_match: self.min_should_match,
            score_mode: ctx.score_mode,
        }))
    }

    fn clause_count(&self) -> usize {
        self.clauses.iter().map(|(_, q)| q.clause_count()).sum()
    }
}

pub struct BooleanWeight {
    clauses: Vec<(Occur, Box<dyn Weight>)>,
    min_should_match: usize,
    score_mode: ScoreMode,
}

impl Weight for BooleanWeight {
    fn scorer_supplier<'a>(
        &'a self,
        segment: &'a MemorySegment,
    ) -> Result<Option<Box<dyn ScorerSupplier<'a> + 'a>>> {
        let mut must = Vec::new();
        let mut filter = Vec::new();
        let mut should = Vec::new();
        let mut must_not = Vec::new();
        for (occur, weight) in &self.clauses {
            match (weight.scorer_supplier(segment)?, occur) {
                (Some(supplier), Occur::Must) => must.push(supplier),
                (Some(supplier), Occur::Filter) => filter.push(supplier),
                (Some(supplier), Occur::Should) => should.push(supplier),
                (Some(supplier), Occur::MustNot) => must_not.push(supplier),
                // a required clause without matches empties the whole query
                (None, Occur::Must | Occur::Filter) => return Ok(None),
                (None, Occur::Should | Occur::MustNot) => {}
            }
        }

        let mut min_should_match = self.min_should_match;
        if should.len() < min_should_match {
            return Ok(None);
        }
        if min_should_match > 0 && should.len() == min_should_match {
            // every optional clause has to match
            must.append(&mut should);
            min_should_match = 0;
        }
        if !self.score_mode.needs_scores()
            && min_should_match == 0
            && !(must.is_empty() && filter.is_empty())
        {
            // optional clauses change nothing without scores
            should.clear();
        }
        if must.is_empty() && filter.is_empty() && should.is_empty() {
            return Ok(None);
        }

        if must_not.is_empty() && min_should_match == 0 {
            match (must.len(), filter.len(), should.len()) {
                (1, 0, 0) => return Ok(must.pop()),
                (0, 0, 1) => return Ok(should.pop()),
                (0, 1, 0) if !self.score_mode.needs_scores() => return Ok(filter.pop()),
                _ => {}
            }
        }

        Ok(Some(Box::new(BooleanScorerSupplier::new(
            must,
            filter,
            should,
            must_not,
            min_should_match,
            self.score_mode,
        )?)))
    }
}

/// Builds the scorer tree of one boolean query on one segment.
pub struct BooleanScorerSupplier<'a> {
    must: Vec<Supplier<'a>>,
    filter: Vec<Supplier<'a>>,
    should: Vec<Supplier<'a>>,
    must_not: Vec<Supplier<'a>>,
    min_should_match: usize,
    score_mode: ScoreMode,
    top_level_scoring_clause: bool,
    cost: u64,
}

impl<'a> BooleanScorerSupplier<'a> {
    pub fn new(
        must: Vec<Supplier<'a>>,
        filter: Vec<Supplier<'a>>,
        should: Vec<Supplier<'a>>,
        must_not: Vec<Supplier<'a>>,
        min_should_match: usize,
        score_mode: ScoreMode,
    ) -> Result<Self> {
        if must.is_empty() && filter.is_empty() && should.is_empty() {
            return Err(Error::NoPositiveClause);
        }
        if min_should_match > 0 && min_should_match >= should.len() {
            return Err(Error::MinShouldMatch {
                min_should_match,
                should_count: should.len(),
            });
        }
        if !score_mode.needs_scores()
            && min_should_match == 0
            && !should.is_empty()
            && !(must.is_empty() && filter.is_empty())
        {
            return Err(Error::InvalidClauses {
                occur: Occur::Should,
                index: 0,
                reason: "purely optional clauses cannot be combined with required clauses \
                         when scores are not needed"
                    .to_string(),
            });
        }
        let cost = Self::compute_cost(&must, &filter, &should, min_should_match);
        Ok(Self {
            must,
            filter,
            should,
            must_not,
            min_should_match,
            score_mode,
            top_level_scoring_clause: false,
            cost,
        })
    }

    fn compute_cost(
        must: &[Supplier<'a>],
        filter: &[Supplier<'a>],
        should: &[Supplier<'a>],
        min_should_match: usize,
    ) -> u64 {
        let min_required_cost = must.iter().chain(filter).map(|s| s.cost()).min();
        match min_required_cost {
            Some(cost) if min_should_match == 0 => cost,
            _ => {
                let should_cost =
                    cost_with_min_should_match(should.iter().map(|s| s.cost()), min_should_match);
                min_required_cost.unwrap_or(u64::MAX).min(should_cost)
            }
        }
    }

    /// Conjunction of the required clauses.
    fn required(
        filter: Vec<Supplier<'a>>,
        mut must: Vec<Supplier<'a>>,
        score_mode: ScoreMode,
        lead_cost: u64,
        top_level_scoring_clause: bool,
    ) -> Result<Box<dyn Scorer + 'a>> {
        if must.len() + filter.len() == 1 {
            let only_filter = must.is_empty();
            let Some(mut supplier) = must.pop().or_else(|| filter.into_iter().next()) else {
                return Err(Error::NoPositiveClause);
            };
            if top_level_scoring_clause {
                supplier.set_top_level_scoring_clause();
            }
            let scorer = supplier.get(lead_cost)?;
            if score_mode.needs_scores() && only_filter {
                // the filter must not leak its own scores
                return Ok(Box::new(ConstantScorer::filter(scorer)));
            }
            return Ok(scorer);
        }

        let non_scoring = filter
            .into_iter()
            .map(|s| s.get(lead_cost))
            .collect::<Result<Vec<_>>>()?;
        let mut scoring = must
            .into_iter()
            .map(|s| s.get(lead_cost))
            .collect::<Result<Vec<_>>>()?;
        if score_mode == ScoreMode::TopScores && top_level_scoring_clause && scoring.len() > 1 {
            let block_max: Box<dyn Scorer + 'a> =
                Box::new(BlockMaxConjunctionScorer::new(scoring)?);
            if non_scoring.is_empty() {
                return Ok(block_max);
            }
            scoring = vec![block_max];
        }
        Ok(Box::new(ConjunctionScorer::new(scoring, non_scoring)?))
    }

    /// Disjunction of the optional clauses.
    fn optional(
        mut should: Vec<Supplier<'a>>,
        min_should_match: usize,
        score_mode: ScoreMode,
        lead_cost: u64,
        top_level_scoring_clause: bool,
    ) -> Result<Box<dyn Scorer + 'a>> {
        if should.len() == 1
            && let Some(mut supplier) = should.pop()
        {
            if top_level_scoring_clause {
                supplier.set_top_level_scoring_clause();
            }
            return supplier.get(lead_cost);
        }
        let scorers = should
            .into_iter()
            .map(|s| s.get(lead_cost))
            .collect::<Result<Vec<_>>>()?;
        if (score_mode == ScoreMode::TopScores && top_level_scoring_clause) || min_should_match > 1
        {
            Ok(Box::new(WandScorer::new(scorers, min_should_match, score_mode)?))
        } else {
            Ok(Box::new(DisjunctionScorer::new(scorers)))
        }
    }

    /// Subtract the prohibited clauses from `main`.
    fn excluded(
        main: Box<dyn Scorer + 'a>,
        must_not: Vec<Supplier<'a>>,
        lead_cost: u64,
    ) -> Result<Box<dyn Scorer + 'a>> {
        if must_not.is_empty() {
            return Ok(main);
        }
        let excl = Self::optional(must_not, 1, ScoreMode::CompleteNoScores, lead_cost, false)?;
        Ok(Box::new(ReqExclScorer::new(main, excl)))
    }
}

impl<'a> ScorerSupplier<'a> for BooleanScorerSupplier<'a> {
    fn cost(&self) -> u64 {
        self.cost
    }

    fn set_top_level_scoring_clause(&mut self) {
        self.top_level_scoring_clause = true;
    }

    fn get(self: Box<Self>, lead_cost: u64) -> Result<Box<dyn Scorer + 'a>> {
        let Self {
            must,
            filter,
            should,
            must_not,
            min_should_match,
            score_mode,
            top_level_scoring_clause: top_level,
            cost,
        } = *self;
        let lead_cost = lead_cost.min(cost);
        debug!(
            "boolean scorer: must={} filter={} should={} (msm={}) must_not={} cost={} lead_cost={} mode={:?} top_level={}",
            must.len(),
            filter.len(),
            should.len(),
            min_should_match,
            must_not.len(),
            cost,
            lead_cost,
            score_mode,
            top_level,
        );

        if should.is_empty() {
            let req = Self::required(filter, must, score_mode, lead_cost, top_level)?;
            return Self::excluded(req, must_not, lead_cost);
        }
        if must.is_empty() && filter.is_empty() {
            let opt = Self::optional(should, min_should_match, score_mode, lead_cost, top_level)?;
            return Self::excluded(opt, must_not, lead_cost);
        }

        let req = Self::required(filter, must, score_mode, lead_cost, false)?;
        let req = Self::excluded(req, must_not, lead_cost)?;
        let opt = Self::optional(should, min_should_match, score_mode, lead_cost, false)?;
        if min_should_match > 0 {
            // the optional side has to match too
            Ok(Box::new(ConjunctionScorer::new(vec![req, opt], Vec::new())?))
        } else {
            Ok(Box::new(ReqOptSumScorer::new(req, opt, score_mode)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::docset::{DocSet, SortedVecDocSet, collect_docs};
    use crate::query::stats::CollectionStats;
    use crate::query::term::TermQuery;
    use crate::query::traits::ReadyScorer;
    use crate::structures::SegmentBuilder;
    use crate::{DocId, SearchConfig};

    fn segment() -> Arc<MemorySegment> {
        let mut builder = SegmentBuilder::new(0);
        builder.add_text("apple banana"); // 0
        builder.add_text("apple cherry"); // 1
        builder.add_text("banana cherry"); // 2
        builder.add_text("apple banana cherry"); // 3
        builder.add_text("durian"); // 4
        Arc::new(builder.build().unwrap())
    }

    fn run(query: &dyn Query, score_mode: ScoreMode) -> Result<Vec<DocId>> {
        run_with(query, score_mode, &SearchConfig::default())
    }

    fn run_with(query: &dyn Query, score_mode: ScoreMode, config: &SearchConfig) -> Result<Vec<DocId>> {
        let segment = segment();
        let stats = CollectionStats::for_segment(&segment);
        let ctx = SearchContext {
            score_mode,
            stats: &stats,
            config,
        };
        let weight = query.weight(&ctx)?;
        match weight.scorer(&segment)? {
            Some(mut scorer) => collect_docs(&mut scorer),
            None => Ok(Vec::new()),
        }
    }

    fn term(text: &str) -> TermQuery {
        TermQuery::new(text)
    }

    fn supplier(docs: &[DocId]) -> Supplier<'static> {
        Box::new(ReadyScorer::new(ConstantScorer::new(
            SortedVecDocSet::new(Arc::new(docs.to_vec())),
            1.0,
            ScoreMode::Complete,
        )))
    }

    #[test]
    fn test_required_and_prohibited() {
        let q = BooleanQuery::new().must(term("apple")).must(term("banana"));
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![0, 3]);

        let q = BooleanQuery::new().must(term("apple")).must_not(term("cherry"));
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![0]);

        let q = BooleanQuery::new()
            .filter(term("cherry"))
            .must_not(term("apple"))
            .must_not(term("durian"));
        assert_eq!(run(&q, ScoreMode::CompleteNoScores).unwrap(), vec![2]);
    }

    #[test]
    fn test_optional_clauses() {
        let q = BooleanQuery::new().should(term("apple")).should(term("durian"));
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![0, 1, 3, 4]);

        // required + optional: the optional clause only adds score
        let q = BooleanQuery::new().must(term("apple")).should(term("banana"));
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![0, 1, 3]);

        let q = BooleanQuery::new().filter(term("apple")).should(term("banana"));
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn test_optional_clauses_dropped_without_scores() {
        let q = BooleanQuery::new().must(term("apple")).should(term("banana"));
        assert_eq!(run(&q, ScoreMode::CompleteNoScores).unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn test_min_should_match() {
        let q = BooleanQuery::new()
            .should(term("apple"))
            .should(term("banana"))
            .should(term("cherry"))
            .should(term("durian"))
            .with_min_should_match(2);
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![0, 1, 2, 3]);

        let q = BooleanQuery::new()
            .should(term("apple"))
            .should(term("banana"))
            .should(term("cherry"))
            .with_min_should_match(3);
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![3]);

        // mixed: the optional side becomes required
        let q = BooleanQuery::new()
            .must(term("cherry"))
            .should(term("apple"))
            .should(term("banana"))
            .should(term("durian"))
            .with_min_should_match(1);
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_terms() {
        let q = BooleanQuery::new().must(term("apple")).must(term("zebra"));
        assert!(run(&q, ScoreMode::Complete).unwrap().is_empty());

        let q = BooleanQuery::new().should(term("apple")).should(term("zebra"));
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![0, 1, 3]);

        // one SHOULD clause left for min_should_match=2
        let q = BooleanQuery::new()
            .should(term("apple"))
            .should(term("zebra"))
            .with_min_should_match(2);
        assert!(run(&q, ScoreMode::Complete).unwrap().is_empty());

        let q = BooleanQuery::new().must(term("apple")).must_not(term("zebra"));
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn test_nested_boolean() {
        let inner = BooleanQuery::new().should(term("banana")).should(term("durian"));
        let q = BooleanQuery::new().must(term("cherry")).must(inner);
        assert_eq!(run(&q, ScoreMode::Complete).unwrap(), vec![2, 3]);
        assert_eq!(q.clause_count(), 3);
    }

    #[test]
    fn test_validation_errors() {
        let q = BooleanQuery::new().must_not(term("apple"));
        assert!(matches!(
            run(&q, ScoreMode::Complete),
            Err(Error::NoPositiveClause)
        ));

        let q = BooleanQuery::new()
            .should(term("apple"))
            .should(term("banana"))
            .with_min_should_match(3);
        assert!(matches!(
            run(&q, ScoreMode::Complete),
            Err(Error::MinShouldMatch {
                min_should_match: 3,
                should_count: 2
            })
        ));

        let config = SearchConfig {
            max_clause_count: 2,
            ..SearchConfig::default()
        };
        let q = BooleanQuery::new()
            .must(term("apple"))
            .should(BooleanQuery::new().should(term("banana")).should(term("cherry")));
        assert!(matches!(
            run_with(&q, ScoreMode::Complete, &config),
            Err(Error::TooManyClauses { count: 3, max: 2 })
        ));
    }

    #[test]
    fn test_optional_with_required_needs_scores() {
        let result = BooleanScorerSupplier::new(
            vec![supplier(&[1, 2])],
            Vec::new(),
            vec![supplier(&[2, 3])],
            Vec::new(),
            0,
            ScoreMode::CompleteNoScores,
        );
        assert!(matches!(
            result,
            Err(Error::InvalidClauses {
                occur: Occur::Should,
                ..
            })
        ));
        let result = BooleanScorerSupplier::new(
            Vec::new(),
            Vec::new(),
            vec![supplier(&[1]), supplier(&[2])],
            Vec::new(),
            2,
            ScoreMode::Complete,
        );
        assert!(matches!(result, Err(Error::MinShouldMatch { .. })));
    }

    #[test]
    fn test_cost() {
        let build = |must: Vec<Supplier<'static>>, should: Vec<Supplier<'static>>, msm| {
            BooleanScorerSupplier::new(must, Vec::new(), should, Vec::new(), msm, ScoreMode::Complete)
                .unwrap()
                .cost()
        };
        let docs = |n: u32| (0..n).collect::<Vec<DocId>>();
        let should = || vec![supplier(&docs(10)), supplier(&docs(3)), supplier(&docs(7))];

        assert_eq!(build(vec![supplier(&docs(5)), supplier(&docs(4))], should(), 0), 4);
        assert_eq!(build(vec![supplier(&docs(5))], should(), 2), 5);
        assert_eq!(build(vec![supplier(&docs(50))], should(), 2), 10);
        assert_eq!(build(Vec::new(), should(), 0), 20);
        assert_eq!(build(Vec::new(), should(), 2), 10);
    }

    #[test]
    fn test_compiled_scores() {
        let supplier = BooleanScorerSupplier::new(
            vec![supplier(&[1, 3, 5])],
            vec![supplier(&[1, 2, 3, 5])],
            vec![supplier(&[3, 4, 5])],
            vec![supplier(&[5])],
            0,
            ScoreMode::Complete,
        )
        .unwrap();
        let mut scorer = Box::new(supplier).get(u64::MAX).unwrap();
        let mut hits = Vec::new();
        while scorer.doc() != crate::query::docset::TERMINATED {
            if scorer.matches().unwrap() {
                hits.push((scorer.doc(), scorer.score().unwrap()));
            }
            scorer.advance().unwrap();
        }
        assert_eq!(hits, vec![(1, 1.0), (3, 2.0)]);
    }

    #[test]
    fn test_display() {
        let q = BooleanQuery::new()
            .must(term("apple"))
            .filter(term("banana"))
            .should(term("cherry"))
            .must_not(term("durian"))
            .with_min_should_match(1);
        assert_eq!(q.to_string(), "Boolean(+apple #banana cherry -durian)~1");
    }
}
