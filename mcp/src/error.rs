//! Error taxonomy for the dispatcher boundary.
//!
//! Every handler error collapses to one of two JSON-RPC codes: a caller
//! mistake (`-32602 Invalid params`) or an unexpected failure
//! (`-32603 Internal error`, message carried in `data`). Parse and envelope
//! errors (`-32700`, `-32600`, `-32601`) are raised by the dispatcher itself
//! before a handler is ever reached, so they have no [`DispatchError`] variant.

use cyberon_core::{GraphError, QueryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> i64 {
        match self {
            DispatchError::InvalidParams(_) => -32602,
            DispatchError::Internal(_) => -32603,
        }
    }

    /// The generic JSON-RPC `error.message` for this error's code, per
    /// §4.3/§7 — the original error text belongs in `error.data`, not here.
    pub fn message(&self) -> &'static str {
        match self {
            DispatchError::InvalidParams(_) => "Invalid params",
            DispatchError::Internal(_) => "Internal error",
        }
    }

    /// The original error text, carried in `error.data`.
    pub fn data(&self) -> String {
        self.to_string()
    }
}

impl From<QueryError> for DispatchError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Validation(msg) => DispatchError::InvalidParams(msg),
            QueryError::NotFound(msg) => DispatchError::InvalidParams(msg),
            other => DispatchError::Internal(other.to_string()),
        }
    }
}

impl From<GraphError> for DispatchError {
    fn from(err: GraphError) -> Self {
        DispatchError::InvalidParams(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}
