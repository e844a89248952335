use std::{hint::black_box, time::Duration};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use graphqa::{
    GraphStore,
    backend::SqliteGraphStore,
    bench_utils::{DatasetShape, generate_dataset},
    cypher,
    seed::load_seed,
};

const DATASET_SEED: u64 = 0xC0DE;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);
const TIMEOUT: Duration = Duration::from_secs(30);

const QUERIES: &[(&str, &str)] = &[
    ("label_scan", "MATCH (c:Contract) RETURN c.name ORDER BY c.name LIMIT 10"),
    (
        "one_hop",
        "MATCH (c:Contract)-[r:HAS_CLAUSE]->(k:Clause) WHERE k.title = 'Term' RETURN c.name, r.position",
    ),
    (
        "two_hop",
        "MATCH (p:Party)-[:PARTY_TO]->(c:Contract)-[:HAS_CLAUSE]->(k:Clause) RETURN p.name, count(k) AS clauses",
    ),
    (
        "optional_refs",
        "MATCH (k:Clause) OPTIONAL MATCH (k)-[:REFERS_TO]->(o) RETURN k.title, count(o) AS refs",
    ),
];

fn seeded_store(contracts: usize) -> SqliteGraphStore {
    let shape = DatasetShape {
        contracts,
        ..DatasetShape::default()
    };
    let doc = generate_dataset(shape, DATASET_SEED);
    let store = SqliteGraphStore::in_memory().expect("store");
    store
        .with_graph(|graph| load_seed(graph, &doc))
        .expect("seed");
    store
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("cypher_parse");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for (name, text) in QUERIES {
        group.bench_function(*name, |b| {
            b.iter(|| cypher::parse(black_box(text)).expect("parse"));
        });
    }
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("cypher_execute");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for contracts in [20, 100] {
        let store = seeded_store(contracts);
        for (name, text) in QUERIES {
            group.bench_with_input(BenchmarkId::new(*name, contracts), text, |b, text| {
                b.iter(|| store.run(black_box(text), TIMEOUT).expect("run"));
            });
        }
    }
    group.finish();
}

fn bench_introspect(c: &mut Criterion) {
    let mut group = c.benchmark_group("schema_introspect");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for contracts in [20, 100] {
        let store = seeded_store(contracts);
        group.bench_function(BenchmarkId::from_parameter(contracts), |b| {
            b.iter(|| store.fetch_schema(TIMEOUT).expect("schema"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_execute, bench_introspect);
criterion_main!(benches);
