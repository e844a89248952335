//! JSON seed documents for loading a graph in one transaction.
//!
//! ```json
//! {
//!   "nodes": [{"key": "c1", "labels": ["Contract"], "properties": {"name": "NDA"}}],
//!   "relationships": [{"from": "c1", "to": "k1", "type": "HAS_CLAUSE"}]
//! }
//! ```

use std::{fs, path::Path};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    errors::GraphStoreError,
    graph::{NodeSpec, Properties, RelationshipSpec, SqliteGraph},
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedDocument {
    #[serde(default)]
    pub nodes: Vec<SeedNode>,
    #[serde(default)]
    pub relationships: Vec<SeedRelationship>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedNode {
    /// Document-local handle referenced by relationships.
    pub key: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedRelationship {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub nodes: usize,
    pub relationships: usize,
}

impl SeedDocument {
    pub fn from_json(text: &str) -> Result<Self, GraphStoreError> {
        serde_json::from_str(text)
            .map_err(|e| GraphStoreError::invalid_input(format!("invalid seed document: {e}")))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GraphStoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            GraphStoreError::invalid_input(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }
}

/// Loads every node and relationship or nothing.
pub fn load_seed(graph: &SqliteGraph, doc: &SeedDocument) -> Result<SeedSummary, GraphStoreError> {
    let tx = graph.transaction()?;
    let mut ids: AHashMap<&str, i64> = AHashMap::with_capacity(doc.nodes.len());
    for node in &doc.nodes {
        if ids.contains_key(node.key.as_str()) {
            return Err(GraphStoreError::invalid_input(format!(
                "duplicate seed key {}",
                node.key
            )));
        }
        let spec = NodeSpec {
            labels: node.labels.clone(),
            properties: node.properties.clone(),
        };
        ids.insert(&node.key, graph.insert_node(&spec)?);
    }
    for rel in &doc.relationships {
        let endpoint = |key: &str| {
            ids.get(key).copied().ok_or_else(|| {
                GraphStoreError::invalid_input(format!("relationship references unknown key {key}"))
            })
        };
        let mut spec = RelationshipSpec::new(endpoint(&rel.from)?, endpoint(&rel.to)?, &rel.rel_type);
        spec.properties = rel.properties.clone();
        graph.insert_relationship(&spec)?;
    }
    tx.commit()
        .map_err(|e| GraphStoreError::query(e.to_string()))?;
    let summary = SeedSummary {
        nodes: doc.nodes.len(),
        relationships: doc.relationships.len(),
    };
    info!(nodes = summary.nodes, relationships = summary.relationships, "seed loaded");
    Ok(summary)
}
