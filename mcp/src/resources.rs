//! The `resources` extension registry: read-only `cyberon://` views over the
//! graph and the structured outline.
//!
//! `resources/read` dispatches purely on the URI's path; every concrete
//! binding below returns the envelope the spec requires:
//! `{contents:[{uri, mimeType:"application/json", text:<stringified JSON>}]}`.

use std::collections::HashMap;
use std::sync::Arc;

use cyberon_core::QueryEngine;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::DispatchError;

pub const SCHEME: &str = "cyberon://";

/// A `cyberon://` URI split into its path segments and query parameters.
struct ParsedUri {
    segments: Vec<String>,
    query: HashMap<String, String>,
}

fn parse_uri(uri: &str) -> Result<ParsedUri, DispatchError> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| DispatchError::InvalidParams(format!("unsupported URI scheme: {uri}")))?;
    let (path, query_str) = rest.split_once('?').unwrap_or((rest, ""));
    let segments = path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
    let mut query = HashMap::new();
    for pair in query_str.split('&').filter(|s| !s.is_empty()) {
        if let Some((k, v)) = pair.split_once('=') {
            query.insert(urldecode(k), urldecode(v));
        }
    }
    Ok(ParsedUri { segments, query })
}

/// Minimal `%XX`/`+` decoding; the query strings this server parses never
/// carry anything beyond ASCII identifiers and simple search terms.
fn urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""), 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn contents(uri: &str, value: &Value) -> Value {
    json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": serde_json::to_string(value).unwrap_or_default(),
        }]
    })
}

pub struct ResourceRegistry {
    engine: Arc<RwLock<QueryEngine>>,
}

impl ResourceRegistry {
    pub fn new(engine: Arc<RwLock<QueryEngine>>) -> Self {
        Self { engine }
    }

    /// Seed catalog: a concrete URI for every known entity type and outline
    /// section, plus the top-5 central entities with their centrality noted
    /// in the description.
    pub async fn list(&self) -> Value {
        let engine = self.engine.read().await;
        let mut entries = vec![
            json!({"uri": "cyberon:///graph/summary", "name": "Ontology summary", "mimeType": "application/json"}),
            json!({"uri": "cyberon:///entity/search", "name": "Entity search", "mimeType": "application/json"}),
        ];
        for entity_type in engine.get_entity_types().keys() {
            entries.push(json!({
                "uri": format!("cyberon:///entity_type/{entity_type}"),
                "name": format!("Entities of type '{entity_type}'"),
                "mimeType": "application/json",
            }));
        }
        for relationship_type in engine.get_relationship_types().keys() {
            entries.push(json!({
                "uri": format!("cyberon:///relationship_type/{relationship_type}"),
                "name": format!("Relationships of type '{relationship_type}'"),
                "mimeType": "application/json",
            }));
        }
        for section_num in engine.structured_ontology().0.keys() {
            entries.push(json!({
                "uri": format!("cyberon:///section/{section_num}"),
                "name": format!("Outline section {section_num}"),
                "mimeType": "application/json",
            }));
        }
        if let Ok(central) = engine.get_central_entities(5, None) {
            for entity in central {
                entries.push(json!({
                    "uri": format!("cyberon:///entity/{}", entity.id),
                    "name": entity.label,
                    "description": format!("centrality {:.3}", entity.centrality),
                    "mimeType": "application/json",
                }));
            }
        }
        json!({ "resources": entries })
    }

    pub fn templates(&self) -> Value {
        json!({
            "resourceTemplates": [
                {"uriTemplate": "cyberon:///entity/{id}", "name": "Entity by id", "mimeType": "application/json"},
                {"uriTemplate": "cyberon:///entity/search{?query,type}", "name": "Entity search", "mimeType": "application/json"},
                {"uriTemplate": "cyberon:///relationship/{id}", "name": "Relationship by id", "mimeType": "application/json"},
                {"uriTemplate": "cyberon:///entity_type/{type}", "name": "Entities of a type", "mimeType": "application/json"},
                {"uriTemplate": "cyberon:///relationship_type/{type}", "name": "Relationships of a type", "mimeType": "application/json"},
                {"uriTemplate": "cyberon:///section/{n}{/subsection}", "name": "Outline section/subsection", "mimeType": "application/json"},
                {"uriTemplate": "cyberon:///paths{?source,target,max_length}", "name": "Path query", "mimeType": "application/json"},
                {"uriTemplate": "cyberon:///connections/{id}{?max_distance}", "name": "Connection distance shells", "mimeType": "application/json"},
                {"uriTemplate": "cyberon:///graph/summary", "name": "Ontology summary", "mimeType": "application/json"},
            ]
        })
    }

    pub async fn read(&self, uri: &str) -> Result<Value, DispatchError> {
        let parsed = parse_uri(uri)?;
        let engine = self.engine.read().await;
        let segments: Vec<&str> = parsed.segments.iter().map(String::as_str).collect();

        let payload = match segments.as_slice() {
            ["entity", "search"] => {
                let query = parsed.query.get("query").cloned().unwrap_or_default();
                let types = parsed.query.get("type").map(|t| vec![t.clone()]);
                let hits = engine.search_entities(&query, types.as_deref());
                json!({ "query": query, "results": hits })
            }
            ["entity", id] => engine.query_entity(id)?,
            ["relationship", id] => serde_json::to_value(engine.get_relationship(id)?)?,
            ["entity_type", entity_type] => {
                let members: Vec<Value> = engine
                    .search_entities("", Some(std::slice::from_ref(&entity_type.to_string())))
                    .into_iter()
                    .map(|h| json!({"id": h.id, "label": h.label}))
                    .collect();
                let members = if members.is_empty() {
                    engine
                        .list_entities(Some(entity_type), None, usize::MAX, 0, "label", "asc")
                        .get("items")
                        .cloned()
                        .unwrap_or(Value::Array(Vec::new()))
                } else {
                    Value::Array(members)
                };
                let count = members.as_array().map(Vec::len).unwrap_or(0);
                json!({ "type": entity_type, "count": count, "entities": members })
            }
            ["relationship_type", relationship_type] => {
                let rels = engine.list_relationships(None, None, None, Some(relationship_type), usize::MAX, 0, "id", "asc");
                json!({
                    "type": relationship_type,
                    "count": rels.get("total").cloned().unwrap_or(json!(0)),
                    "relationships": rels.get("items").cloned().unwrap_or(Value::Array(Vec::new())),
                })
            }
            ["section", n] => {
                let section_num: i64 = n
                    .parse()
                    .map_err(|_| DispatchError::InvalidParams(format!("invalid section number: {n}")))?;
                let section = engine
                    .structured_ontology()
                    .0
                    .get(&section_num)
                    .ok_or_else(|| DispatchError::InvalidParams(format!("section {section_num} not found")))?;
                serde_json::to_value(section)?
            }
            ["section", n, subsection] => {
                let section_num: i64 = n
                    .parse()
                    .map_err(|_| DispatchError::InvalidParams(format!("invalid section number: {n}")))?;
                let items = engine
                    .get_subsection_content(section_num, subsection)
                    .ok_or_else(|| DispatchError::InvalidParams(format!("subsection '{subsection}' not found in section {section_num}")))?;
                json!({ "section": section_num, "subsection": subsection, "items": items })
            }
            ["paths"] => {
                let source = parsed.query.get("source").ok_or_else(|| DispatchError::InvalidParams("'source' is required".into()))?;
                let target = parsed.query.get("target").ok_or_else(|| DispatchError::InvalidParams("'target' is required".into()))?;
                let max_length: usize = parsed.query.get("max_length").and_then(|v| v.parse().ok()).unwrap_or(3);
                json!({ "paths": engine.find_paths(source, target, max_length) })
            }
            ["connections", id] => {
                let max_distance: usize = parsed.query.get("max_distance").and_then(|v| v.parse().ok()).unwrap_or(2);
                json!({ "connections": engine.find_connections(id, max_distance)? })
            }
            ["graph", "summary"] => engine.generate_ontology_summary(),
            _ => return Err(DispatchError::InvalidParams(format!("unresolvable resource path: {uri}"))),
        };

        Ok(contents(uri, &payload))
    }

    pub fn subscribe(&self, uri: Option<&str>) -> Result<Value, DispatchError> {
        uri.ok_or_else(|| DispatchError::InvalidParams("'uri' is required".into()))?;
        Ok(json!({}))
    }

    pub fn unsubscribe(&self, uri: Option<&str>) -> Result<Value, DispatchError> {
        uri.ok_or_else(|| DispatchError::InvalidParams("'uri' is required".into()))?;
        Ok(json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    async fn sample() -> ResourceRegistry {
        let mut engine = QueryEngine::empty();
        engine.create_entity(None, "Feedback Loop", "concept", None, None, Map::new()).unwrap();
        engine.create_entity(None, "Homeostasis", "concept", None, None, Map::new()).unwrap();
        engine
            .create_relationship("feedback_loop", "homeostasis", "enables", Map::new())
            .unwrap();
        ResourceRegistry::new(Arc::new(RwLock::new(engine)))
    }

    #[tokio::test]
    async fn reads_entity_by_id() {
        let registry = sample().await;
        let value = registry.read("cyberon:///entity/feedback_loop").await.unwrap();
        let text = value["contents"][0]["text"].as_str().unwrap();
        assert!(text.contains("feedback_loop"));
    }

    #[tokio::test]
    async fn unresolvable_path_is_invalid_params() {
        let registry = sample().await;
        let err = registry.read("cyberon:///bogus/path").await.unwrap_err();
        assert_eq!(err.code(), crate::protocol::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn summary_resource_reports_counts() {
        let registry = sample().await;
        let value = registry.read("cyberon:///graph/summary").await.unwrap();
        let text = value["contents"][0]["text"].as_str().unwrap();
        assert!(text.contains("\"node_count\":2"));
    }

    #[tokio::test]
    async fn subscribe_requires_uri() {
        let registry = sample().await;
        assert!(registry.subscribe(None).is_err());
        assert_eq!(registry.subscribe(Some("cyberon:///graph/summary")).unwrap(), json!({}));
    }
}
