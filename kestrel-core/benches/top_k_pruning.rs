//! Pruned vs exhaustive top-k search on a generated corpus
//!
//! Run with: cargo bench -p kestrel-core --bench top_k_pruning

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kestrel_core::{BooleanQuery, MemorySegment, Query, SearchConfig, SegmentBuilder, Searcher, TermQuery};

const VOCAB_SIZE: usize = 2_000;
const DOCS_PER_SEGMENT: u32 = 50_000;
const NUM_SEGMENTS: u32 = 4;

fn term(i: usize) -> String {
    format!("t{i}")
}

/// Zipf-like term distribution: low ids are much more frequent.
fn generate_segments(seed: u64) -> Vec<Arc<MemorySegment>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let vocab: Vec<String> = (0..VOCAB_SIZE).map(term).collect();
    (0..NUM_SEGMENTS)
        .map(|s| {
            let mut builder = SegmentBuilder::new(s).with_doc_base(s * DOCS_PER_SEGMENT);
            for _ in 0..DOCS_PER_SEGMENT {
                let len = rng.random_range(8..64);
                let tokens: Vec<&str> = (0..len)
                    .map(|_| {
                        let u: f64 = rng.random();
                        let idx = ((VOCAB_SIZE as f64).powf(u) as usize - 1).min(VOCAB_SIZE - 1);
                        vocab[idx].as_str()
                    })
                    .collect();
                builder.add_document(tokens);
            }
            Arc::new(builder.build().expect("segment build"))
        })
        .collect()
}

fn queries() -> Vec<(&'static str, Box<dyn Query>)> {
    vec![
        ("term", Box::new(TermQuery::new(term(3)))),
        (
            "or3",
            Box::new(
                BooleanQuery::new()
                    .should(TermQuery::new(term(1)))
                    .should(TermQuery::new(term(20)))
                    .should(TermQuery::new(term(300))),
            ),
        ),
        (
            "and2",
            Box::new(
                BooleanQuery::new()
                    .must(TermQuery::new(term(2)))
                    .must(TermQuery::new(term(40))),
            ),
        ),
        (
            "and_or",
            Box::new(
                BooleanQuery::new()
                    .must(TermQuery::new(term(5)))
                    .should(TermQuery::new(term(0)))
                    .should(TermQuery::new(term(150))),
            ),
        ),
    ]
}

fn bench_top_k(c: &mut Criterion) {
    let config = SearchConfig {
        total_hits_threshold: 1_000,
        ..SearchConfig::default()
    };
    let searcher = Searcher::new(generate_segments(42), config);

    for (name, query) in queries() {
        let mut group = c.benchmark_group(format!("top_k/{name}"));
        for k in [10usize, 100] {
            group.bench_with_input(BenchmarkId::new("pruned", k), &k, |b, &k| {
                b.iter(|| black_box(searcher.search(query.as_ref(), k).expect("search")));
            });
            group.bench_with_input(BenchmarkId::new("exhaustive", k), &k, |b, &k| {
                b.iter(|| {
                    black_box(
                        searcher
                            .search_exhaustive(query.as_ref(), k)
                            .expect("search"),
                    )
                });
            });
        }
        group.finish();
    }
}

fn bench_count(c: &mut Criterion) {
    let searcher = Searcher::new(generate_segments(7), SearchConfig::default());
    let mut group = c.benchmark_group("count");
    for (name, query) in queries() {
        group.bench_function(name, |b| {
            b.iter(|| black_box(searcher.count(query.as_ref()).expect("count")));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_top_k, bench_count);
criterion_main!(benches);
