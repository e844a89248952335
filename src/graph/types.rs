use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::GraphStoreError;

pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: Properties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphRelationship {
    pub id: i64,
    pub start: i64,
    pub end: i64,
    pub rel_type: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSpec {
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl NodeSpec {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            properties: Properties::new(),
        }
    }

    pub fn property<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipSpec {
    pub start: i64,
    pub end: i64,
    pub rel_type: String,
    pub properties: Properties,
}

impl RelationshipSpec {
    pub fn new<T: Into<String>>(start: i64, end: i64, rel_type: T) -> Self {
        Self {
            start,
            end,
            rel_type: rel_type.into(),
            properties: Properties::new(),
        }
    }

    pub fn property<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

pub fn validate_node(spec: &NodeSpec) -> Result<(), GraphStoreError> {
    for label in &spec.labels {
        validate_identifier(label, "node label")?;
    }
    validate_properties(&spec.properties)
}

pub fn validate_relationship(spec: &RelationshipSpec) -> Result<(), GraphStoreError> {
    validate_identifier(&spec.rel_type, "relationship type")?;
    if spec.start <= 0 || spec.end <= 0 {
        return Err(GraphStoreError::invalid_input(
            "relationship endpoints must be positive ids",
        ));
    }
    validate_properties(&spec.properties)
}

pub fn validate_identifier(value: &str, what: &str) -> Result<(), GraphStoreError> {
    if value.trim().is_empty() {
        return Err(GraphStoreError::invalid_input(format!("{what} must be set")));
    }
    Ok(())
}

fn validate_properties(properties: &Properties) -> Result<(), GraphStoreError> {
    for (key, value) in properties {
        validate_identifier(key, "property key")?;
        if value.is_object() {
            return Err(GraphStoreError::invalid_input(format!(
                "property `{key}` cannot hold a map"
            )));
        }
    }
    Ok(())
}

pub fn row_to_node(row: &rusqlite::Row<'_>) -> Result<(i64, Properties), rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let data: String = row.get(1)?;
    Ok((id, decode_properties(&data)?))
}

pub fn row_to_relationship(row: &rusqlite::Row<'_>) -> Result<GraphRelationship, rusqlite::Error> {
    let data: String = row.get(4)?;
    Ok(GraphRelationship {
        id: row.get(0)?,
        start: row.get(1)?,
        end: row.get(2)?,
        rel_type: row.get(3)?,
        properties: decode_properties(&data)?,
    })
}

fn decode_properties(data: &str) -> Result<Properties, rusqlite::Error> {
    serde_json::from_str(data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            data.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}
