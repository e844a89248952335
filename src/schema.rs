use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Labels, relationship types and property names present in the graph.
///
/// Built once per fetch and never mutated afterwards; shared as
/// `Arc<SchemaSnapshot>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    node_properties: BTreeMap<String, BTreeSet<String>>,
    relationship_properties: BTreeMap<String, BTreeSet<String>>,
    patterns: BTreeSet<(String, String, String)>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label<I, S>(mut self, label: &str, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_properties
            .entry(label.to_string())
            .or_default()
            .extend(properties.into_iter().map(Into::into));
        self
    }

    pub fn with_relationship<I, S>(mut self, rel_type: &str, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationship_properties
            .entry(rel_type.to_string())
            .or_default()
            .extend(properties.into_iter().map(Into::into));
        self
    }

    /// Records `(:start)-[:rel_type]->(:end)`; both labels and the type are
    /// registered if missing.
    pub fn with_pattern(mut self, start: &str, rel_type: &str, end: &str) -> Self {
        self.node_properties.entry(start.to_string()).or_default();
        self.node_properties.entry(end.to_string()).or_default();
        self.relationship_properties
            .entry(rel_type.to_string())
            .or_default();
        self.patterns
            .insert((start.to_string(), rel_type.to_string(), end.to_string()));
        self
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.node_properties.keys().map(String::as_str)
    }

    pub fn relationship_types(&self) -> impl Iterator<Item = &str> {
        self.relationship_properties.keys().map(String::as_str)
    }

    pub fn patterns(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.patterns
            .iter()
            .map(|(s, t, e)| (s.as_str(), t.as_str(), e.as_str()))
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.node_properties.contains_key(label)
    }

    pub fn has_relationship_type(&self, rel_type: &str) -> bool {
        self.relationship_properties.contains_key(rel_type)
    }

    pub fn label_has_property(&self, label: &str, property: &str) -> bool {
        self.node_properties
            .get(label)
            .is_some_and(|props| props.contains(property))
    }

    pub fn relationship_has_property(&self, rel_type: &str, property: &str) -> bool {
        self.relationship_properties
            .get(rel_type)
            .is_some_and(|props| props.contains(property))
    }

    /// True if any label or relationship type declares `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.node_properties
            .values()
            .chain(self.relationship_properties.values())
            .any(|props| props.contains(property))
    }

    pub fn is_empty(&self) -> bool {
        self.node_properties.is_empty() && self.relationship_properties.is_empty()
    }

    /// Prompt rendering. Sorted, so equal snapshots render identically.
    pub fn render(&self) -> String {
        let mut out = String::from("Node properties:\n");
        for (label, props) in &self.node_properties {
            out.push_str(&format!("{label} {}\n", braces(props)));
        }
        out.push_str("Relationship properties:\n");
        for (rel_type, props) in &self.relationship_properties {
            out.push_str(&format!("{rel_type} {}\n", braces(props)));
        }
        out.push_str("The relationships:\n");
        for (start, rel_type, end) in &self.patterns {
            out.push_str(&format!("(:{start})-[:{rel_type}]->(:{end})\n"));
        }
        out
    }
}

fn braces(props: &BTreeSet<String>) -> String {
    let joined: Vec<&str> = props.iter().map(String::as_str).collect();
    format!("{{{}}}", joined.join(", "))
}
