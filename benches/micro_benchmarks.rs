//! Microbenchmarks for the hot paths of resolution.
//!
//! Spec evaluation runs once per term per candidate pair, and candidate
//! queries once per ingested record, so both dominate ingest time.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use oyster_rs::config::{BlockingMode, TruncationConfig};
use oyster_rs::ontology::IndexRule;
use oyster_rs::test_support::{default_config, generate_people, PERSON_ATTRIBUTES};
use oyster_rs::{BlockingIndex, MatchSpec, Resolver, RuleEngine, Schema};
use std::hint::black_box;
use std::time::Duration;

// =============================================================================
// MATCHER BENCHMARKS - Spec Evaluation
// =============================================================================

const PAIRS: [(&str, &str); 4] = [
    ("Catherine", "Katherine"),
    ("Jonathan", "Jonathon"),
    ("123 N Main St Apt 4", "123 North Main Street #4"),
    ("555-TAXI", "555-8294"),
];

/// Pre-parsed specs; parsing happens once at configuration time.
fn bench_spec_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("spec_evaluate");
    group.warm_up_time(Duration::from_millis(500));
    let engine = RuleEngine::new();

    for spec in [
        "EXACT",
        "SOUNDEX",
        "DMSOUNDEX",
        "DOUBLEMETAPHONE",
        "LED(0.8)",
        "QTR(0.25)",
        "SMITHWATERMAN(2,-1,-1,0.8)",
        "NICKNAME",
        "PHONEMATCH",
        "ADDRESS",
    ] {
        let parsed = MatchSpec::parse(spec).expect("bench spec parses");
        group.throughput(Throughput::Elements(PAIRS.len() as u64));
        group.bench_with_input(BenchmarkId::new("parsed", spec), &parsed, |b, parsed| {
            b.iter(|| {
                for (s, t) in PAIRS {
                    black_box(engine.evaluate_spec(Some(s), Some(t), parsed));
                }
            })
        });
    }

    group.finish();
}

/// The string entry point re-parses the spec on every call.
fn bench_spec_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("spec_parse");
    for spec in ["~EXACT", "LED(0.8)", "SCAN(LR,DIGIT,9,KeepCase,SameOrder)", "WITHINDAYS(MM/dd/yyyy,30)"] {
        group.bench_with_input(BenchmarkId::from_parameter(spec), &spec, |b, spec| {
            b.iter(|| black_box(MatchSpec::parse(spec)))
        });
    }
    group.finish();
}

// =============================================================================
// INDEX BENCHMARKS - Key Derivation and Candidate Queries
// =============================================================================

fn person_index(schema: &Schema) -> BlockingIndex {
    let rules = vec![
        IndexRule::new(schema, "ssn", [("ssn", "SCAN(LR,DIGIT,9,KeepCase,SameOrder)")])
            .expect("ssn rule"),
        IndexRule::new(schema, "name", [("last", "SOUNDEX"), ("dob", "EXACT")]).expect("name rule"),
        IndexRule::new(schema, "first", [("first", "NYSIIS(4)")]).expect("first rule"),
    ];
    BlockingIndex::new(BlockingMode::Rules, rules, TruncationConfig::default())
}

fn bench_index_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_candidates");
    group.sample_size(30);
    let schema = Schema::new(PERSON_ATTRIBUTES).expect("person schema");

    for &count in &[1_000usize, 10_000] {
        let people = generate_people(&schema, count, 0.25, 42);
        let mut index = person_index(&schema);
        for record in &people {
            index.insert(record).expect("generated records have RefIDs");
        }
        let queries: Vec<_> = people.iter().step_by(10).cloned().collect();

        group.throughput(Throughput::Elements(queries.len() as u64));
        group.bench_with_input(BenchmarkId::new("query", count), &queries, |b, queries| {
            b.iter(|| {
                for record in queries {
                    black_box(index.candidates(record));
                }
            })
        });
    }

    group.finish();
}

fn bench_index_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_insert");
    let schema = Schema::new(PERSON_ATTRIBUTES).expect("person schema");
    let people = generate_people(&schema, 5_000, 0.25, 7);

    group.throughput(Throughput::Elements(people.len() as u64));
    group.bench_function("insert_5000", |b| {
        b.iter_batched(
            || person_index(&schema),
            |mut index| {
                for record in &people {
                    let _ = index.insert(record);
                }
                index
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

// =============================================================================
// PIPELINE BENCHMARK - Block, Match, Merge
// =============================================================================

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    group.sample_size(10);

    for &count in &[1_000usize, 5_000] {
        let config = default_config();
        let schema = config.schema().expect("default schema");
        let people = generate_people(&schema, count, 0.3, 99);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("people", count), &people, |b, people| {
            b.iter_batched(
                || {
                    (
                        Resolver::new(config.clone()).expect("default config builds"),
                        people.clone(),
                    )
                },
                |(mut resolver, people)| black_box(resolver.ingest(people)),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(matcher_benches, bench_spec_evaluation, bench_spec_parse);
criterion_group!(index_benches, bench_index_candidates, bench_index_insert);
criterion_group!(pipeline_benches, bench_ingest);

criterion_main!(matcher_benches, index_benches, pipeline_benches);
