use std::time::Duration;

use graphqa::{
    CypherError, GraphStoreError,
    backend::{GraphStore, SqliteGraphStore},
    cypher,
};
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(5);

fn seeded_store() -> SqliteGraphStore {
    let store = SqliteGraphStore::in_memory().expect("store");
    store
        .run(
            "CREATE (a:Contract {name: 'NDA', value: 100})-[:HAS_CLAUSE {position: 1}]->(:Clause {title: 'Term'}), \
             (a)-[:HAS_CLAUSE {position: 2}]->(:Clause {title: 'Liability'}), \
             (:Contract {name: 'Lease', value: 250})",
            TIMEOUT,
        )
        .expect("seed");
    store
}

#[test]
fn test_create_reports_write_stats() {
    let store = SqliteGraphStore::in_memory().expect("store");
    let result = store
        .run("CREATE (a:Contract {name: 'x'})-[:HAS_CLAUSE]->(b:Clause)", TIMEOUT)
        .expect("create");
    assert_eq!(result.stats.nodes_created, 2);
    assert_eq!(result.stats.relationships_created, 1);
    assert_eq!(result.stats.properties_set, 1);
    assert!(result.columns.is_empty());
}

#[test]
fn test_match_where_return_columns() {
    let store = seeded_store();
    let result = store
        .run(
            "MATCH (c:Contract) WHERE c.value > 150 RETURN c.name, c.value AS amount",
            TIMEOUT,
        )
        .expect("query");
    assert_eq!(result.columns, vec!["c.name", "amount"]);
    assert_eq!(result.rows, vec![vec![json!("Lease"), json!(250)]]);
}

#[test]
fn test_relationship_traversal_with_order() {
    let store = seeded_store();
    let result = store
        .run(
            "MATCH (c:Contract {name: 'NDA'})-[r:HAS_CLAUSE]->(k:Clause) \
             RETURN k.title AS title ORDER BY r.position DESC",
            TIMEOUT,
        )
        .expect("query");
    assert_eq!(result.rows, vec![vec![json!("Liability")], vec![json!("Term")]]);
}

#[test]
fn test_incoming_direction() {
    let store = seeded_store();
    let result = store
        .run(
            "MATCH (k:Clause)<-[:HAS_CLAUSE]-(c) RETURN DISTINCT c.name AS name",
            TIMEOUT,
        )
        .expect("query");
    assert_eq!(result.rows, vec![vec![json!("NDA")]]);
}

#[test]
fn test_aggregation_groups_by_keys() {
    let store = seeded_store();
    let result = store
        .run(
            "MATCH (c:Contract) OPTIONAL MATCH (c)-[:HAS_CLAUSE]->(k) \
             RETURN c.name AS name, count(k) AS clauses ORDER BY name",
            TIMEOUT,
        )
        .expect("query");
    assert_eq!(
        result.rows,
        vec![vec![json!("Lease"), json!(0)], vec![json!("NDA"), json!(2)]]
    );
}

#[test]
fn test_count_star_on_empty_match() {
    let store = SqliteGraphStore::in_memory().expect("store");
    let result = store
        .run("MATCH (n:Party) RETURN count(*) AS total", TIMEOUT)
        .expect("query");
    assert_eq!(result.rows, vec![vec![json!(0)]]);
}

#[test]
fn test_collect_and_functions() {
    let store = seeded_store();
    let result = store
        .run(
            "MATCH (k:Clause) WITH k ORDER BY k.title \
             RETURN collect(toUpper(k.title)) AS titles, size(collect(k)) AS n",
            TIMEOUT,
        )
        .expect("query");
    assert_eq!(result.rows, vec![vec![json!(["LIABILITY", "TERM"]), json!(2)]]);
}

#[test]
fn test_string_predicates_and_regex() {
    let store = seeded_store();
    let result = store
        .run(
            "MATCH (k:Clause) WHERE k.title STARTS WITH 'L' OR k.title =~ 'T.*m' \
             RETURN k.title AS t ORDER BY t",
            TIMEOUT,
        )
        .expect("query");
    assert_eq!(result.rows, vec![vec![json!("Liability")], vec![json!("Term")]]);
}

#[test]
fn test_null_comparison_filters_row() {
    let store = seeded_store();
    let result = store
        .run("MATCH (k:Clause) WHERE k.missing = 1 RETURN k", TIMEOUT)
        .expect("query");
    assert!(result.is_empty());
}

#[test]
fn test_nodes_render_as_json_objects() {
    let store = seeded_store();
    let result = store
        .run("MATCH (c:Contract {name: 'Lease'}) RETURN c", TIMEOUT)
        .expect("query");
    let node = &result.rows[0][0];
    assert_eq!(node["labels"], json!(["Contract"]));
    assert_eq!(node["properties"]["value"], json!(250));
}

#[test]
fn test_unwind_and_skip_limit() {
    let store = SqliteGraphStore::in_memory().expect("store");
    let result = store
        .run("UNWIND range(1, 10) AS x RETURN x SKIP 2 LIMIT 3", TIMEOUT)
        .expect("query");
    assert_eq!(result.rows, vec![vec![json!(3)], vec![json!(4)], vec![json!(5)]]);
}

#[test]
fn test_set_and_delete() {
    let store = seeded_store();
    let set = store
        .run("MATCH (c:Contract {name: 'Lease'}) SET c.value = 300, c:Archived", TIMEOUT)
        .expect("set");
    assert_eq!(set.stats.properties_set, 1);
    assert_eq!(set.stats.labels_added, 1);
    let deleted = store
        .run("MATCH (c:Archived) DELETE c", TIMEOUT)
        .expect("delete");
    assert_eq!(deleted.stats.nodes_deleted, 1);
    store.with_graph(|graph| assert_eq!(graph.counts().expect("counts"), (3, 2)));
}

#[test]
fn test_delete_attached_node_is_constraint_violation() {
    let store = seeded_store();
    let err = store
        .run("MATCH (c:Contract {name: 'NDA'}) DELETE c", TIMEOUT)
        .unwrap_err();
    assert!(matches!(err, CypherError::Constraint(_)));
    store.with_graph(|graph| assert_eq!(graph.counts().expect("counts"), (4, 2)));
}

#[test]
fn test_detach_delete_removes_relationships() {
    let store = seeded_store();
    let result = store
        .run("MATCH (c:Contract {name: 'NDA'}) DETACH DELETE c", TIMEOUT)
        .expect("detach");
    assert_eq!(result.stats.nodes_deleted, 1);
    assert_eq!(result.stats.relationships_deleted, 2);
}

#[test]
fn test_failed_write_rolls_back() {
    let store = SqliteGraphStore::in_memory().expect("store");
    let err = store
        .run("CREATE (a:Contract) WITH a RETURN 1 / 0 AS boom", TIMEOUT)
        .unwrap_err();
    assert!(matches!(err, CypherError::Type(_)));
    store.with_graph(|graph| assert_eq!(graph.counts().expect("counts"), (0, 0)));
}

#[test]
fn test_read_only_queries_do_not_commit() {
    let store = seeded_store();
    store
        .run("MATCH (c:Contract) RETURN c.name", TIMEOUT)
        .expect("read");
    store.with_graph(|graph| assert_eq!(graph.counts().expect("counts"), (4, 2)));
}

#[test]
fn test_zero_timeout_reports_store_timeout() {
    let store = seeded_store();
    let err = store
        .run("MATCH (n) RETURN n", Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, CypherError::Store(GraphStoreError::Timeout(_))));
}

#[test]
fn test_unsupported_constructs() {
    for query in [
        "MERGE (n:Contract) RETURN n",
        "MATCH (a)-[*1..3]->(b) RETURN b",
        "MATCH (n) RETURN n UNION MATCH (m) RETURN m",
        "MATCH (n) WHERE n.name = $name RETURN n",
    ] {
        assert!(
            matches!(cypher::parse(query), Err(CypherError::Unsupported(_))),
            "{query}"
        );
    }
}

#[test]
fn test_syntax_error_has_offset() {
    match cypher::parse("MATCH (n RETURN n") {
        Err(CypherError::Syntax { offset, .. }) => assert!(offset > 0),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_unknown_variable_is_semantic_error() {
    let store = SqliteGraphStore::in_memory().expect("store");
    let err = store.run("MATCH (n) RETURN m", TIMEOUT).unwrap_err();
    assert!(matches!(err, CypherError::Semantic(_)));
}
