use serde::Serialize;
use serde_json::Value;

/// Counters for the writes a statement performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub nodes_created: usize,
    pub nodes_deleted: usize,
    pub relationships_created: usize,
    pub relationships_deleted: usize,
    pub properties_set: usize,
    pub labels_added: usize,
}

impl WriteStats {
    pub fn is_empty(&self) -> bool {
        *self == WriteStats::default()
    }
}

/// Ordered columns and rows returned by one statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: WriteStats,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            stats: WriteStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }

    /// One row as a JSON object whose keys follow column order.
    pub fn row_json(&self, row: usize) -> Option<String> {
        let values = self.rows.get(row)?;
        let mut out = String::from("{");
        for (idx, (column, value)) in self.columns.iter().zip(values).enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            out.push_str(&Value::String(column.clone()).to_string());
            out.push_str(": ");
            out.push_str(&value.to_string());
        }
        out.push('}');
        Some(out)
    }
}
