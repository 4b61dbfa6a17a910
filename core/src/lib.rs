//! # cyberon-core
//!
//! Core types and the in-memory query engine for the cyberon ontology
//! server: the entity/relationship data model, the directed labeled
//! property graph that stores them, the structured-outline companion
//! index, and the bit-exact JSON persistence format that round-trips both.

pub mod errors;
pub mod graph;
pub mod outline;
pub mod persistence;
pub mod query_engine;
pub mod types;

pub use errors::{GraphError, GraphResult, QueryError, QueryResult};
pub use outline::{Section, StructuredOntology, TopicHit};
pub use persistence::{KnowledgeGraphDocument, PersistenceDocument};
pub use query_engine::QueryEngine;
pub use types::{render_timestamp, Entity, Relationship};

/// Convenience re-exports for downstream crates (`mcp`, `cyberond`, and the
/// presentation transports).
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::graph::GraphStore;
    pub use crate::outline::*;
    pub use crate::persistence::*;
    pub use crate::query_engine::QueryEngine;
    pub use crate::types::*;
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{Map, Value};
}
