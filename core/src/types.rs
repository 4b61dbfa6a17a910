//! Entity and relationship record types.
//!
//! An [`Entity`] is a node in the ontology graph; a [`Relationship`] is a
//! directed, labeled, id-bearing edge between two entities. Both carry an
//! open `attributes` map alongside their fixed fields, following the
//! "polymorphic entity as a single record with an open attribute map"
//! design note rather than modeling entity kinds through inheritance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved entity field names that may never be set through the
/// `attributes` back-channel of `create_entity`/`update_entity`.
pub const RESERVED_ENTITY_KEYS: &[&str] = &[
    "id",
    "label",
    "type",
    "description",
    "external_url",
    "created_at",
    "updated_at",
];

/// Reserved relationship field names excluded from `attributes`.
pub const RESERVED_RELATIONSHIP_KEYS: &[&str] = &["id", "label", "created_at", "updated_at"];

/// A node in the ontology graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    /// Set on creation, never mutated afterward. `None` only for nodes
    /// that were present in the initial load without a timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Open attribute map; never contains any of [`RESERVED_ENTITY_KEYS`].
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    /// Render this entity the way `query_entity`'s `attributes` field does:
    /// the fixed fields plus the open attribute map, all in one object.
    pub fn to_attributes_value(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("label".into(), Value::String(self.label.clone()));
        map.insert("type".into(), Value::String(self.entity_type.clone()));
        if let Some(d) = &self.description {
            map.insert("description".into(), Value::String(d.clone()));
        }
        if let Some(u) = &self.external_url {
            map.insert("external_url".into(), Value::String(u.clone()));
        }
        if let Some(c) = self.created_at {
            map.insert("created_at".into(), Value::String(render_timestamp(c)));
        }
        if let Some(u) = self.updated_at {
            map.insert("updated_at".into(), Value::String(render_timestamp(u)));
        }
        Value::Object(map)
    }
}

/// A directed, labeled edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Stored as the edge's `label` in persistence payloads.
    pub relationship_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Relationship {
    pub fn to_attributes_value(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("source".into(), Value::String(self.source_id.clone()));
        map.insert("target".into(), Value::String(self.target_id.clone()));
        map.insert(
            "label".into(),
            Value::String(self.relationship_type.clone()),
        );
        if let Some(c) = self.created_at {
            map.insert("created_at".into(), Value::String(render_timestamp(c)));
        }
        if let Some(u) = self.updated_at {
            map.insert("updated_at".into(), Value::String(render_timestamp(u)));
        }
        Value::Object(map)
    }
}

/// Render a timestamp the way the engine expects on the wire: ISO-8601
/// with a trailing literal `Z` rather than chrono's default `+00:00` offset.
pub fn render_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// One step of a path returned by `find_paths`.
#[derive(Debug, Clone, Serialize)]
pub struct PathStep {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_to_next: Option<String>,
}

/// A single connected/related neighbor, as returned by connection and
/// relationship-oriented queries.
#[derive(Debug, Clone, Serialize)]
pub struct NeighborRef {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// An outgoing or incoming edge summary as returned inside `query_entity`.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeRef {
    pub id: String,
    pub label: String,
    pub relationship: String,
}

/// A scored search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub score: f64,
}

/// One entry of `get_central_entities`.
#[derive(Debug, Clone, Serialize)]
pub struct CentralEntity {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub centrality: f64,
    pub connections: usize,
}

/// One entry of `get_related_concepts`, grouped by relationship type.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedConcept {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub direction: String,
}
