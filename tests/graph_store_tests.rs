use std::time::Duration;

use graphqa::{
    GraphStoreError,
    backend::{GraphStore, SqliteGraphStore, introspect},
    graph::{Direction, NodeSpec, RelationshipSpec, SqliteGraph},
};
use serde_json::json;

fn contract_graph() -> (SqliteGraph, i64, i64) {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    let contract = graph
        .insert_node(&NodeSpec::new(["Contract"]).property("name", json!("NDA")))
        .expect("contract");
    let clause = graph
        .insert_node(&NodeSpec::new(["Clause"]).property("title", json!("Term")))
        .expect("clause");
    graph
        .insert_relationship(
            &RelationshipSpec::new(contract, clause, "HAS_CLAUSE").property("position", json!(1)),
        )
        .expect("rel");
    (graph, contract, clause)
}

#[test]
fn test_insert_and_get_node() {
    let (graph, contract, _) = contract_graph();
    let node = graph.get_node(contract).expect("node");
    assert_eq!(node.labels, vec!["Contract".to_string()]);
    assert_eq!(node.properties.get("name"), Some(&json!("NDA")));
}

#[test]
fn test_missing_node_is_not_found() {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    assert!(matches!(graph.get_node(42), Err(GraphStoreError::NotFound(_))));
}

#[test]
fn test_empty_label_rejected() {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    let err = graph.insert_node(&NodeSpec::new([""])).unwrap_err();
    assert!(matches!(err, GraphStoreError::InvalidInput(_)));
}

#[test]
fn test_relationship_requires_existing_endpoints() {
    let (graph, contract, _) = contract_graph();
    let err = graph
        .insert_relationship(&RelationshipSpec::new(contract, 999, "HAS_CLAUSE"))
        .unwrap_err();
    assert!(matches!(err, GraphStoreError::InvalidInput(_)));
}

#[test]
fn test_delete_attached_node_requires_detach() {
    let (graph, contract, clause) = contract_graph();
    let err = graph.delete_node(contract, false).unwrap_err();
    assert!(matches!(err, GraphStoreError::ConstraintViolation(_)));
    graph.delete_node(contract, true).expect("detach delete");
    assert_eq!(graph.counts().expect("counts"), (1, 0));
    assert!(graph.get_node(clause).is_ok());
}

#[test]
fn test_set_node_property_null_removes() {
    let (graph, contract, _) = contract_graph();
    graph
        .set_node_property(contract, "value", json!(10))
        .expect("set");
    graph
        .set_node_property(contract, "name", json!(null))
        .expect("remove");
    let node = graph.get_node(contract).expect("node");
    assert_eq!(node.properties.get("value"), Some(&json!(10)));
    assert!(node.properties.get("name").is_none());
}

#[test]
fn test_relationships_of_respects_direction() {
    let (graph, contract, clause) = contract_graph();
    let out = graph
        .relationships_of(contract, Direction::Outgoing, &[])
        .expect("out");
    assert_eq!(out.len(), 1);
    assert!(
        graph
            .relationships_of(contract, Direction::Incoming, &[])
            .expect("in")
            .is_empty()
    );
    let both = graph
        .relationships_of(clause, Direction::Both, &["HAS_CLAUSE".to_string()])
        .expect("both");
    assert_eq!(both[0].start, contract);
}

#[test]
fn test_self_loop_listed_once_for_both_directions() {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    let node = graph.insert_node(&NodeSpec::new(["Clause"])).expect("node");
    graph
        .insert_relationship(&RelationshipSpec::new(node, node, "REFERS_TO"))
        .expect("loop");
    assert_eq!(
        graph
            .relationships_of(node, Direction::Both, &[])
            .expect("both")
            .len(),
        1
    );
}

#[test]
fn test_introspection_builds_snapshot() {
    let (graph, _, _) = contract_graph();
    let snapshot = introspect(&graph).expect("schema");
    assert!(snapshot.label_has_property("Contract", "name"));
    assert!(snapshot.relationship_has_property("HAS_CLAUSE", "position"));
    assert_eq!(
        snapshot.patterns().collect::<Vec<_>>(),
        vec![("Contract", "HAS_CLAUSE", "Clause")]
    );
}

#[test]
fn test_store_fetch_schema_renders_sorted() {
    let (graph, _, _) = contract_graph();
    let store = SqliteGraphStore::from_graph(graph);
    let snapshot = store.fetch_schema(Duration::from_secs(5)).expect("schema");
    assert_eq!(
        snapshot.render(),
        "Node properties:\nClause {title}\nContract {name}\nRelationship properties:\n\
         HAS_CLAUSE {position}\nThe relationships:\n(:Contract)-[:HAS_CLAUSE]->(:Clause)\n"
    );
}

#[test]
fn test_file_backed_graph_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("graph.db");
    {
        let graph = SqliteGraph::open(&path).expect("open");
        graph.insert_node(&NodeSpec::new(["Party"])).expect("node");
    }
    let graph = SqliteGraph::open(&path).expect("reopen");
    assert_eq!(graph.labels().expect("labels"), vec!["Party".to_string()]);
}
