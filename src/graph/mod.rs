mod deadline;
mod sqlite_graph;
mod tables;
mod types;

pub use deadline::DeadlineGuard;
pub use sqlite_graph::SqliteGraph;
pub use tables::ensure_tables;
pub use types::{
    Direction, GraphNode, GraphRelationship, NodeSpec, Properties, RelationshipSpec,
};
