use rusqlite::Connection;

use crate::errors::GraphStoreError;

pub fn ensure_tables(conn: &Connection) -> Result<(), GraphStoreError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            properties TEXT NOT NULL DEFAULT '{}'
        );
        CREATE TABLE IF NOT EXISTS graph_labels (
            node_id INTEGER NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
            label   TEXT NOT NULL,
            PRIMARY KEY (node_id, label)
        );
        CREATE TABLE IF NOT EXISTS graph_relationships (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            from_id    INTEGER NOT NULL REFERENCES graph_nodes(id),
            to_id      INTEGER NOT NULL REFERENCES graph_nodes(id),
            rel_type   TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_labels_label ON graph_labels(label);
        CREATE INDEX IF NOT EXISTS idx_rel_from ON graph_relationships(from_id);
        CREATE INDEX IF NOT EXISTS idx_rel_to ON graph_relationships(to_id);
        CREATE INDEX IF NOT EXISTS idx_rel_type ON graph_relationships(rel_type);
        "#,
    )
    .map_err(|e| GraphStoreError::schema(e.to_string()))?;
    Ok(())
}
