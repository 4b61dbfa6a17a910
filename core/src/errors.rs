//! Error types for the cyberon core engine

use thiserror::Error;

/// Errors raised by the primitive [`crate::graph::GraphStore`] layer.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    #[error("node already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("no path between {from} and {to}")]
    NoPath { from: String, to: String },
}

/// Errors raised by the [`crate::query_engine::QueryEngine`] for CRUD mutations.
///
/// Mirrors the two kinds the specification calls out: `Validation` (bad
/// input, duplicates, conflicts) and `NotFound` (silent — usually turned
/// into an `{"error": ...}` payload by the caller rather than propagated).
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl QueryError {
    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryError::NotFound(_))
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
pub type QueryResult<T> = Result<T, QueryError>;
