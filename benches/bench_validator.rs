use std::{hint::black_box, time::Duration};

use criterion::{Criterion, criterion_group, criterion_main};
use graphqa::{
    GeneratedQuery,
    backend::introspect,
    bench_utils::{DatasetShape, generate_dataset},
    graph::SqliteGraph,
    seed::load_seed,
    validator::QueryValidator,
};

const SAMPLE_SIZE: usize = 30;
const WARM_UP: Duration = Duration::from_millis(200);
const MEASURE: Duration = Duration::from_millis(400);

fn bench_validate(c: &mut Criterion) {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    load_seed(&graph, &generate_dataset(DatasetShape::default(), 7)).expect("seed");
    let schema = introspect(&graph).expect("schema");
    let validator = QueryValidator::default();

    let valid = GeneratedQuery::new(
        "MATCH (p:Party {country: 'SE'})-[:PARTY_TO]->(c:Contract)-[r:HAS_CLAUSE]->(k:Clause) \
         WHERE c.value > 5000 AND k.title STARTS WITH 'Term' \
         RETURN p.name, c.name, r.position, k.text ORDER BY r.position",
    );
    let invalid = GeneratedQuery::new(
        "MATCH (c:Contract)-[:HAS_CLAUSE]->(k:Clause)-[:AMENDS]->(o) RETURN c.name, o.title",
    );

    let mut group = c.benchmark_group("validate");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    group.bench_function("valid_three_hop", |b| {
        b.iter(|| validator.validate(black_box(&valid), &schema).expect("valid"));
    });
    group.bench_function("unknown_type", |b| {
        b.iter(|| validator.validate(black_box(&invalid), &schema).unwrap_err());
    });
    group.finish();
}

criterion_group!(benches, bench_validate);
criterion_main!(benches);
