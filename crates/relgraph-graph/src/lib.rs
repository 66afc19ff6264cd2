//! In-memory graph aggregate (C5) and Neo4j graph store adapter (C2).

pub mod aggregate;
pub mod store;

pub use aggregate::{synthesize_id, Direction, GraphAggregate, GraphNode, GraphRelationship, NodeId};
pub use store::{validate_identifier, GraphStoreAdapter, Neo4jStore};

pub use relgraph_common::{RelGraphError, Result};
