//! The `tools` extension registry: named analysis operations over
//! [`cyberon_core::QueryEngine`], each described by a JSON Schema for its
//! parameters.
//!
//! `tools/execute` always returns a successful envelope
//! `{name, timestamp, result}`; a handler failure becomes `{"error": msg}`
//! *inside* `result` rather than a dispatcher error.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use cyberon_core::{render_timestamp, QueryEngine};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::error::DispatchError;

type ToolFn = dyn Fn(&QueryEngine, &Value) -> Result<Value, String> + Send + Sync;

struct Tool {
    description: &'static str,
    schema: Value,
    handler: Box<ToolFn>,
}

pub struct ToolRegistry {
    engine: Arc<RwLock<QueryEngine>>,
    catalog: BTreeMap<&'static str, Tool>,
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("'{key}' is required"))
}

fn optional_usize(params: &Value, key: &str, default: usize) -> usize {
    params.get(key).and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(default)
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

impl ToolRegistry {
    pub fn new(engine: Arc<RwLock<QueryEngine>>) -> Self {
        let mut catalog = BTreeMap::new();

        catalog.insert(
            "cyberon.tools.search",
            Tool {
                description: "Search entities by label/description substring, optionally filtered by type.",
                schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "entity_types": {"type": "array", "items": {"type": "string"}},
                        "limit": {"type": "integer", "minimum": 1},
                    },
                    "required": ["query"],
                }),
                handler: Box::new(|engine, params| {
                    let query = required_str(params, "query")?;
                    let entity_types: Option<Vec<String>> = params
                        .get("entity_types")
                        .and_then(|v| v.as_array())
                        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect());
                    let limit = optional_usize(params, "limit", 10);
                    let mut hits = engine.search_entities(query, entity_types.as_deref());
                    hits.truncate(limit);
                    Ok(json!({ "query": query, "entities": hits, "count": hits.len() }))
                }),
            },
        );

        catalog.insert(
            "cyberon.tools.analyze_entity",
            Tool {
                description: "Summarize one entity's record and its immediate incoming/outgoing connection counts.",
                schema: json!({
                    "type": "object",
                    "properties": {"entity_id": {"type": "string"}},
                    "required": ["entity_id"],
                }),
                handler: Box::new(|engine, params| {
                    let entity_id = required_str(params, "entity_id")?;
                    let entity = engine.query_entity(entity_id).map_err(|e| e.to_string())?;
                    let related = engine.get_related_concepts(entity_id, None).map_err(|e| e.to_string())?;
                    let (mut incoming, mut outgoing) = (0usize, 0usize);
                    for (relationship_type, members) in &related {
                        if relationship_type.starts_with("inverse_") {
                            incoming += members.len();
                        } else {
                            outgoing += members.len();
                        }
                    }
                    Ok(json!({
                        "entity": entity,
                        "connections": {"incoming": incoming, "outgoing": outgoing, "total": incoming + outgoing},
                    }))
                }),
            },
        );

        catalog.insert(
            "cyberon.tools.compare_entities",
            Tool {
                description: "Compare two entities: shared/distinct attributes plus the paths connecting them.",
                schema: json!({
                    "type": "object",
                    "properties": {
                        "entity1_id": {"type": "string"},
                        "entity2_id": {"type": "string"},
                    },
                    "required": ["entity1_id", "entity2_id"],
                }),
                handler: Box::new(|engine, params| {
                    let id1 = required_str(params, "entity1_id")?;
                    let id2 = required_str(params, "entity2_id")?;
                    let entity1 = engine.query_entity(id1).map_err(|e| e.to_string())?;
                    let entity2 = engine.query_entity(id2).map_err(|e| e.to_string())?;
                    let paths = engine.find_paths(id1, id2, 3);

                    let (common, distinct) = diff_attributes(&entity1, &entity2);
                    Ok(json!({
                        "entity1": entity1,
                        "entity2": entity2,
                        "paths": paths,
                        "common_attributes": common,
                        "distinct_attributes": distinct,
                    }))
                }),
            },
        );

        catalog.insert(
            "cyberon.tools.central_entities",
            Tool {
                description: "Rank entities by degree centrality, optionally filtered by type or a minimum connection count.",
                schema: json!({
                    "type": "object",
                    "properties": {
                        "limit": {"type": "integer", "minimum": 1},
                        "entity_type": {"type": "string"},
                        "min_connections": {"type": "integer", "minimum": 0},
                    },
                }),
                handler: Box::new(|engine, params| {
                    let limit = optional_usize(params, "limit", 10);
                    let entity_type = optional_str(params, "entity_type");
                    let min_connections = optional_usize(params, "min_connections", 0);
                    let mut entities = engine.get_central_entities(limit, entity_type).map_err(|e| e.to_string())?;
                    entities.retain(|e| e.connections >= min_connections);
                    Ok(json!({ "entities": entities, "count": entities.len() }))
                }),
            },
        );

        catalog.insert(
            "cyberon.tools.summarize_ontology",
            Tool {
                description: "Report entity/relationship counts and type breakdowns for the whole graph.",
                schema: json!({"type": "object", "properties": {}}),
                handler: Box::new(|engine, _params| Ok(json!({ "summary": engine.generate_ontology_summary() }))),
            },
        );

        catalog.insert(
            "cyberon.tools.concept_hierarchy",
            Tool {
                description: "Analyze the root/depth hierarchy of the graph, optionally scoped to one root concept.",
                schema: json!({
                    "type": "object",
                    "properties": {"root_concept_id": {"type": "string"}},
                }),
                handler: Box::new(|engine, params| {
                    let hierarchy = engine.analyze_concept_hierarchy().map_err(|e| e.to_string())?;
                    match optional_str(params, "root_concept_id") {
                        None => Ok(hierarchy),
                        Some(root_id) => {
                            let root = hierarchy
                                .get("root_nodes")
                                .and_then(|r| r.as_array())
                                .and_then(|rs| rs.iter().find(|r| r.get("id").and_then(|v| v.as_str()) == Some(root_id)))
                                .cloned()
                                .ok_or_else(|| format!("'{root_id}' is not a hierarchy root"))?;
                            let levels = hierarchy.get("hierarchies").and_then(|h| h.get(root_id)).cloned().unwrap_or(json!({}));
                            Ok(json!({ "root": root, "levels": levels }))
                        }
                    }
                }),
            },
        );

        catalog.insert(
            "cyberon.tools.related_concepts",
            Tool {
                description: "List an entity's related concepts grouped by relationship type, with an inverse-edge toggle.",
                schema: json!({
                    "type": "object",
                    "properties": {
                        "entity_id": {"type": "string"},
                        "relationship_type": {"type": "string"},
                        "include_inverse": {"type": "boolean"},
                    },
                    "required": ["entity_id"],
                }),
                handler: Box::new(|engine, params| {
                    let entity_id = required_str(params, "entity_id")?;
                    let relationship_type = optional_str(params, "relationship_type");
                    let include_inverse = params.get("include_inverse").and_then(|v| v.as_bool()).unwrap_or(true);
                    let mut grouped = engine.get_related_concepts(entity_id, relationship_type).map_err(|e| e.to_string())?;
                    if !include_inverse {
                        grouped.retain(|k, _| !k.starts_with("inverse_"));
                    }
                    Ok(json!({ "entity_id": entity_id, "related": grouped }))
                }),
            },
        );

        catalog.insert(
            "cyberon.tools.concept_evolution",
            Tool {
                description: "List evolution chains (ancestor -> descendant edges), optionally filtered to those containing one concept.",
                schema: json!({
                    "type": "object",
                    "properties": {"concept_id": {"type": "string"}},
                }),
                handler: Box::new(|engine, params| {
                    let mut chains = engine.get_concept_evolution();
                    if let Some(concept_id) = optional_str(params, "concept_id") {
                        chains.retain(|chain| chain.iter().any(|step| step.id == concept_id));
                    }
                    Ok(json!({ "chains": chains, "count": chains.len() }))
                }),
            },
        );

        Self { engine, catalog }
    }

    pub fn list(&self) -> Value {
        let tools: Vec<Value> = self
            .catalog
            .iter()
            .map(|(name, tool)| json!({"name": name, "description": tool.description, "schema": tool.schema}))
            .collect();
        json!({ "tools": tools })
    }

    pub fn schema(&self, name: &str) -> Value {
        match self.catalog.get(name) {
            Some(tool) => json!({"name": name, "description": tool.description, "schema": tool.schema}),
            None => json!({ "error": format!("Unknown tool: {name}") }),
        }
    }

    pub async fn execute(&self, name: &str, params: &Value) -> Result<Value, DispatchError> {
        let tool = self
            .catalog
            .get(name)
            .ok_or_else(|| DispatchError::InvalidParams(format!("Unknown tool: {name}")))?;
        let engine = self.engine.read().await;
        let result = match (tool.handler)(&engine, params) {
            Ok(value) => value,
            Err(message) => json!({ "error": message }),
        };
        Ok(json!({
            "name": name,
            "timestamp": render_timestamp(Utc::now()),
            "result": result,
        }))
    }
}

fn diff_attributes(a: &Value, b: &Value) -> (Map<String, Value>, Map<String, Value>) {
    let mut common = Map::new();
    let mut distinct = Map::new();
    let (empty_a, empty_b) = (Map::new(), Map::new());
    let map_a = a.as_object().unwrap_or(&empty_a);
    let map_b = b.as_object().unwrap_or(&empty_b);
    for (key, value_a) in map_a {
        match map_b.get(key) {
            Some(value_b) if value_b == value_a => {
                common.insert(key.clone(), value_a.clone());
            }
            Some(value_b) => {
                distinct.insert(key.clone(), json!({"entity1": value_a, "entity2": value_b}));
            }
            None => {
                distinct.insert(key.clone(), json!({"entity1": value_a, "entity2": Value::Null}));
            }
        }
    }
    for (key, value_b) in map_b {
        if !map_a.contains_key(key) {
            distinct.insert(key.clone(), json!({"entity1": Value::Null, "entity2": value_b}));
        }
    }
    (common, distinct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map as JsonMap;

    async fn sample() -> ToolRegistry {
        let mut engine = QueryEngine::empty();
        engine.create_entity(None, "Feedback Loop", "concept", None, None, JsonMap::new()).unwrap();
        engine.create_entity(None, "Homeostasis", "concept", None, None, JsonMap::new()).unwrap();
        engine
            .create_relationship("feedback_loop", "homeostasis", "enables", JsonMap::new())
            .unwrap();
        ToolRegistry::new(Arc::new(RwLock::new(engine)))
    }

    #[tokio::test]
    async fn search_tool_finds_entity() {
        let registry = sample().await;
        let result = registry.execute("cyberon.tools.search", &json!({"query": "feedback"})).await.unwrap();
        assert_eq!(result["name"], "cyberon.tools.search");
        assert_eq!(result["result"]["entities"][0]["id"], "feedback_loop");
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let registry = sample().await;
        let err = registry.execute("cyberon.tools.nope", &json!({})).await.unwrap_err();
        assert_eq!(err.code(), crate::protocol::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn handler_failure_stays_inside_result() {
        let registry = sample().await;
        let result = registry.execute("cyberon.tools.analyze_entity", &json!({"entity_id": "missing"})).await.unwrap();
        assert!(result["result"]["error"].is_string());
    }

    #[tokio::test]
    async fn compare_entities_diffs_attributes() {
        let registry = sample().await;
        let result = registry
            .execute("cyberon.tools.compare_entities", &json!({"entity1_id": "feedback_loop", "entity2_id": "homeostasis"}))
            .await
            .unwrap();
        assert!(result["result"]["distinct_attributes"].get("label").is_some());
    }

    #[test]
    fn schema_reports_unknown_name() {
        let registry = ToolRegistry::new(Arc::new(RwLock::new(QueryEngine::empty())));
        assert_eq!(registry.schema("nope")["error"], "Unknown tool: nope");
    }
}
