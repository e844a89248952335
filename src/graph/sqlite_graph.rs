use std::{path::Path, time::Duration};

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde_json::Value;

use super::{
    deadline::DeadlineGuard,
    tables::ensure_tables,
    types::{
        Direction, GraphNode, GraphRelationship, NodeSpec, Properties, RelationshipSpec,
        row_to_node, row_to_relationship, validate_identifier, validate_node,
        validate_relationship,
    },
};
use crate::errors::GraphStoreError;

const OUTGOING_SQL: &str = "SELECT id, from_id, to_id, rel_type, properties \
     FROM graph_relationships WHERE from_id=?1 ORDER BY id";
const INCOMING_SQL: &str = "SELECT id, from_id, to_id, rel_type, properties \
     FROM graph_relationships WHERE to_id=?1 ORDER BY id";

pub struct SqliteGraph {
    conn: Connection,
}

impl SqliteGraph {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GraphStoreError> {
        let conn =
            Connection::open(path).map_err(|e| GraphStoreError::connection(e.to_string()))?;
        ensure_tables(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, GraphStoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| GraphStoreError::connection(e.to_string()))?;
        ensure_tables(&conn)?;
        Ok(Self { conn })
    }

    /// Inserts a node and returns its rowid (monotonically increasing per database).
    pub fn insert_node(&self, spec: &NodeSpec) -> Result<i64, GraphStoreError> {
        validate_node(spec)?;
        let data = encode(&spec.properties)?;
        self.conn
            .execute(
                "INSERT INTO graph_nodes(properties) VALUES(?1)",
                params![data],
            )
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let id = self.conn.last_insert_rowid();
        for label in &spec.labels {
            self.add_label(id, label)?;
        }
        Ok(id)
    }

    pub fn get_node(&self, id: i64) -> Result<GraphNode, GraphStoreError> {
        let (id, properties) = self
            .conn
            .prepare_cached("SELECT id, properties FROM graph_nodes WHERE id=?1")
            .and_then(|mut stmt| stmt.query_row(params![id], |row| row_to_node(row)))
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    GraphStoreError::not_found(format!("node {id}"))
                }
                other => GraphStoreError::query(other.to_string()),
            })?;
        Ok(GraphNode {
            id,
            labels: self.node_labels(id)?,
            properties,
        })
    }

    pub fn node_labels(&self, id: i64) -> Result<Vec<String>, GraphStoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT label FROM graph_labels WHERE node_id=?1 ORDER BY rowid")
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![id], |row| row.get(0))
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let mut labels = Vec::new();
        for label in rows {
            labels.push(label.map_err(|e| GraphStoreError::query(e.to_string()))?);
        }
        Ok(labels)
    }

    pub fn add_label(&self, id: i64, label: &str) -> Result<bool, GraphStoreError> {
        validate_identifier(label, "node label")?;
        let affected = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO graph_labels(node_id, label) VALUES(?1, ?2)",
                params![id, label],
            )
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        Ok(affected > 0)
    }

    pub fn update_node_properties(
        &self,
        id: i64,
        properties: &Properties,
    ) -> Result<(), GraphStoreError> {
        let data = encode(properties)?;
        let affected = self
            .conn
            .execute(
                "UPDATE graph_nodes SET properties=?1 WHERE id=?2",
                params![data, id],
            )
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        if affected == 0 {
            return Err(GraphStoreError::not_found(format!("node {id}")));
        }
        Ok(())
    }

    /// Sets a single node property; `null` removes it.
    pub fn set_node_property(
        &self,
        id: i64,
        key: &str,
        value: Value,
    ) -> Result<(), GraphStoreError> {
        let mut node = self.get_node(id)?;
        apply_property(&mut node.properties, key, value)?;
        self.update_node_properties(id, &node.properties)
    }

    /// Deletes a node. Without `detach` the node must have no relationships.
    pub fn delete_node(&self, id: i64, detach: bool) -> Result<(), GraphStoreError> {
        let attached: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM graph_relationships WHERE from_id=?1 OR to_id=?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        if attached > 0 && !detach {
            return Err(GraphStoreError::constraint(format!(
                "node {id} still has {attached} relationship(s); use DETACH DELETE"
            )));
        }
        self.conn
            .execute(
                "DELETE FROM graph_relationships WHERE from_id=?1 OR to_id=?1",
                params![id],
            )
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        self.conn
            .execute("DELETE FROM graph_labels WHERE node_id=?1", params![id])
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let affected = self
            .conn
            .execute("DELETE FROM graph_nodes WHERE id=?1", params![id])
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        if affected == 0 {
            return Err(GraphStoreError::not_found(format!("node {id}")));
        }
        Ok(())
    }

    pub fn insert_relationship(&self, spec: &RelationshipSpec) -> Result<i64, GraphStoreError> {
        validate_relationship(spec)?;
        if !self.node_exists(spec.start)? || !self.node_exists(spec.end)? {
            return Err(GraphStoreError::invalid_input(
                "relationship endpoints must reference existing nodes",
            ));
        }
        let data = encode(&spec.properties)?;
        self.conn
            .execute(
                "INSERT INTO graph_relationships(from_id, to_id, rel_type, properties) \
                 VALUES(?1, ?2, ?3, ?4)",
                params![spec.start, spec.end, spec.rel_type.as_str(), data],
            )
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_relationship(&self, id: i64) -> Result<GraphRelationship, GraphStoreError> {
        self.conn
            .query_row(
                "SELECT id, from_id, to_id, rel_type, properties FROM graph_relationships WHERE id=?1",
                params![id],
                |row| row_to_relationship(row),
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    GraphStoreError::not_found(format!("relationship {id}"))
                }
                other => GraphStoreError::query(other.to_string()),
            })
    }

    pub fn set_relationship_property(
        &self,
        id: i64,
        key: &str,
        value: Value,
    ) -> Result<(), GraphStoreError> {
        let mut rel = self.get_relationship(id)?;
        apply_property(&mut rel.properties, key, value)?;
        let data = encode(&rel.properties)?;
        self.conn
            .execute(
                "UPDATE graph_relationships SET properties=?1 WHERE id=?2",
                params![data, id],
            )
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        Ok(())
    }

    pub fn delete_relationship(&self, id: i64) -> Result<(), GraphStoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM graph_relationships WHERE id=?1", params![id])
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        if affected == 0 {
            return Err(GraphStoreError::not_found(format!("relationship {id}")));
        }
        Ok(())
    }

    pub fn all_node_ids(&self) -> Result<Vec<i64>, GraphStoreError> {
        self.collect_ids("SELECT id FROM graph_nodes ORDER BY id", None)
    }

    pub fn node_ids_with_label(&self, label: &str) -> Result<Vec<i64>, GraphStoreError> {
        self.collect_ids(
            "SELECT node_id FROM graph_labels WHERE label=?1 ORDER BY node_id",
            Some(label),
        )
    }

    /// Relationships touching `node`, ordered by id. An empty `types` slice
    /// accepts every type. With [`Direction::Both`] a self loop is returned once.
    pub fn relationships_of(
        &self,
        node: i64,
        direction: Direction,
        types: &[String],
    ) -> Result<Vec<GraphRelationship>, GraphStoreError> {
        let mut rels = match direction {
            Direction::Outgoing => self.collect_relationships(OUTGOING_SQL, node)?,
            Direction::Incoming => self.collect_relationships(INCOMING_SQL, node)?,
            Direction::Both => {
                let mut all = self.collect_relationships(OUTGOING_SQL, node)?;
                all.extend(
                    self.collect_relationships(INCOMING_SQL, node)?
                        .into_iter()
                        .filter(|rel| rel.start != rel.end),
                );
                all.sort_by_key(|rel| rel.id);
                all
            }
        };
        if !types.is_empty() {
            rels.retain(|rel| types.iter().any(|ty| ty == &rel.rel_type));
        }
        Ok(rels)
    }

    pub fn labels(&self) -> Result<Vec<String>, GraphStoreError> {
        self.collect_strings("SELECT DISTINCT label FROM graph_labels ORDER BY label")
    }

    pub fn relationship_types(&self) -> Result<Vec<String>, GraphStoreError> {
        self.collect_strings("SELECT DISTINCT rel_type FROM graph_relationships ORDER BY rel_type")
    }

    /// `(label, property)` pairs present on stored nodes.
    pub fn node_property_keys(&self) -> Result<Vec<(String, String)>, GraphStoreError> {
        self.collect_pairs(
            "SELECT DISTINCT l.label, j.key \
             FROM graph_labels l \
             JOIN graph_nodes n ON n.id = l.node_id, json_each(n.properties) j \
             ORDER BY 1, 2",
        )
    }

    /// `(relationship type, property)` pairs present on stored relationships.
    pub fn relationship_property_keys(&self) -> Result<Vec<(String, String)>, GraphStoreError> {
        self.collect_pairs(
            "SELECT DISTINCT r.rel_type, j.key \
             FROM graph_relationships r, json_each(r.properties) j \
             ORDER BY 1, 2",
        )
    }

    /// `(start label, type, end label)` triples present in the graph.
    pub fn relationship_patterns(&self) -> Result<Vec<(String, String, String)>, GraphStoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT ls.label, r.rel_type, le.label \
                 FROM graph_relationships r \
                 JOIN graph_labels ls ON ls.node_id = r.from_id \
                 JOIN graph_labels le ON le.node_id = r.to_id \
                 ORDER BY 1, 2, 3",
            )
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let mut patterns = Vec::new();
        for row in rows {
            patterns.push(row.map_err(|e| GraphStoreError::query(e.to_string()))?);
        }
        Ok(patterns)
    }

    /// `(nodes, relationships)`.
    pub fn counts(&self) -> Result<(i64, i64), GraphStoreError> {
        let nodes = self.count("SELECT COUNT(*) FROM graph_nodes")?;
        let rels = self.count("SELECT COUNT(*) FROM graph_relationships")?;
        Ok((nodes, rels))
    }

    pub fn arm_deadline(&self, timeout: Duration) -> DeadlineGuard<'_> {
        DeadlineGuard::arm(&self.conn, timeout)
    }

    /// Transaction over the graph; dropping it without commit rolls back.
    pub fn transaction(&self) -> Result<Transaction<'_>, GraphStoreError> {
        self.conn
            .unchecked_transaction()
            .map_err(|e| GraphStoreError::query(e.to_string()))
    }
}

impl SqliteGraph {
    fn node_exists(&self, id: i64) -> Result<bool, GraphStoreError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM graph_nodes WHERE id=?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        Ok(exists.is_some())
    }

    fn collect_ids(&self, sql: &str, label: Option<&str>) -> Result<Vec<i64>, GraphStoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let mut ids = Vec::new();
        let mut push = |row: Result<i64, rusqlite::Error>| -> Result<(), GraphStoreError> {
            ids.push(row.map_err(|e| GraphStoreError::query(e.to_string()))?);
            Ok(())
        };
        match label {
            Some(label) => {
                let rows = stmt
                    .query_map(params![label], |row| row.get(0))
                    .map_err(|e| GraphStoreError::query(e.to_string()))?;
                for row in rows {
                    push(row)?;
                }
            }
            None => {
                let rows = stmt
                    .query_map([], |row| row.get(0))
                    .map_err(|e| GraphStoreError::query(e.to_string()))?;
                for row in rows {
                    push(row)?;
                }
            }
        }
        Ok(ids)
    }

    fn collect_relationships(
        &self,
        sql: &str,
        node: i64,
    ) -> Result<Vec<GraphRelationship>, GraphStoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![node], |row| row_to_relationship(row))
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let mut rels = Vec::new();
        for rel in rows {
            rels.push(rel.map_err(|e| GraphStoreError::query(e.to_string()))?);
        }
        Ok(rels)
    }

    fn collect_strings(&self, sql: &str) -> Result<Vec<String>, GraphStoreError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let mut values = Vec::new();
        for value in rows {
            values.push(value.map_err(|e| GraphStoreError::query(e.to_string()))?);
        }
        Ok(values)
    }

    fn collect_pairs(&self, sql: &str) -> Result<Vec<(String, String)>, GraphStoreError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| GraphStoreError::query(e.to_string()))?;
        let mut pairs = Vec::new();
        for pair in rows {
            pairs.push(pair.map_err(|e| GraphStoreError::query(e.to_string()))?);
        }
        Ok(pairs)
    }

    fn count(&self, sql: &str) -> Result<i64, GraphStoreError> {
        self.conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| GraphStoreError::query(e.to_string()))
    }
}

fn apply_property(
    properties: &mut Properties,
    key: &str,
    value: Value,
) -> Result<(), GraphStoreError> {
    validate_identifier(key, "property key")?;
    match value {
        Value::Null => {
            properties.remove(key);
        }
        Value::Object(_) => {
            return Err(GraphStoreError::invalid_input(format!(
                "property `{key}` cannot hold a map"
            )));
        }
        other => {
            properties.insert(key.to_string(), other);
        }
    }
    Ok(())
}

fn encode(properties: &Properties) -> Result<String, GraphStoreError> {
    serde_json::to_string(properties).map_err(|e| GraphStoreError::invalid_input(e.to_string()))
}
