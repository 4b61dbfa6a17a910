//! The bit-exact JSON persistence document format.
//!
//! A single document with two top-level keys: `structured_ontology` (the
//! read-mostly outline) and `knowledge_graph` (a node-link representation
//! of the graph, shaped like a `networkx` export — `directed`/`multigraph`
//! flags, a `graph` metadata object, and flat `nodes`/`edges` arrays).
//! Unknown keys at every level are preserved via `#[serde(flatten)]` catch-alls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::outline::StructuredOntology;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraphDocument {
    #[serde(default = "default_true")]
    pub directed: bool,
    #[serde(default)]
    pub multigraph: bool,
    #[serde(default)]
    pub graph: Value,
    #[serde(default)]
    pub nodes: Vec<Map<String, Value>>,
    #[serde(default)]
    pub edges: Vec<Map<String, Value>>,
    /// Any additional `knowledge_graph`-level keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Default for KnowledgeGraphDocument {
    fn default() -> Self {
        Self {
            directed: true,
            multigraph: false,
            graph: Value::Object(Map::new()),
            nodes: Vec::new(),
            edges: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistenceDocument {
    #[serde(default)]
    pub structured_ontology: StructuredOntology,
    #[serde(default)]
    pub knowledge_graph: KnowledgeGraphDocument,
    /// Any additional top-level keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersistenceDocument {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_pretty_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
