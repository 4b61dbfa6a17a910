//! The `prompts` extension registry: named natural-language templates with
//! optional custom handlers that assemble structured `context` alongside
//! the prompt text, for feeding an LLM client.
//!
//! `prompts/get` always returns a successful envelope
//! `{name, timestamp, prompt, context}`; a handler failure becomes
//! `{"error": msg}` inside that envelope, mirroring `tools/execute`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use cyberon_core::{render_timestamp, QueryEngine};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::DispatchError;

type PromptFn = dyn Fn(&QueryEngine, &Value) -> Result<(String, Value), String> + Send + Sync;

struct Prompt {
    description: &'static str,
    template: &'static str,
    parameter_schema: Value,
    handler: Box<PromptFn>,
    usage_examples: Vec<Value>,
}

pub struct PromptRegistry {
    engine: Arc<RwLock<QueryEngine>>,
    catalog: BTreeMap<&'static str, Prompt>,
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("'{key}' is required"))
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn optional_usize(params: &Value, key: &str, default: usize) -> usize {
    params.get(key).and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(default)
}

/// Describe one outgoing/incoming edge group as a short English sentence,
/// e.g. "enables: Homeostasis, Negative Feedback".
fn describe_relations(grouped: &std::collections::BTreeMap<String, Vec<cyberon_core::prelude::RelatedConcept>>) -> Vec<String> {
    grouped
        .iter()
        .map(|(relationship_type, members)| {
            let names: Vec<&str> = members.iter().map(|m| m.label.as_str()).collect();
            format!("{relationship_type}: {}", names.join(", "))
        })
        .collect()
}

impl PromptRegistry {
    pub fn new(engine: Arc<RwLock<QueryEngine>>) -> Self {
        let mut catalog = BTreeMap::new();

        catalog.insert(
            "cyberon.prompts.entity_analysis",
            Prompt {
                description: "Analyze one entity's place in the ontology from its relationships.",
                template: "Analyze the entity '{entity_id}' and describe its role in the ontology.",
                parameter_schema: json!({
                    "type": "object",
                    "properties": {"entity_id": {"type": "string"}},
                    "required": ["entity_id"],
                }),
                usage_examples: vec![json!({"entity_id": "feedback_loop"})],
                handler: Box::new(|engine, params| {
                    let entity_id = required_str(params, "entity_id")?;
                    let entity = engine.query_entity(entity_id).map_err(|e| e.to_string())?;
                    let related = engine.get_related_concepts(entity_id, None).map_err(|e| e.to_string())?;
                    let label = entity.get("label").and_then(|v| v.as_str()).unwrap_or(entity_id);
                    let sentences = describe_relations(&related);
                    let prompt = format!(
                        "Analyze the entity '{label}' ({entity_id}) and describe its role in the cybernetics ontology, \
                         considering the following relationships:\n{}",
                        sentences.join("\n")
                    );
                    Ok((prompt, json!({ "entity": entity, "relationships": sentences })))
                }),
            },
        );

        catalog.insert(
            "cyberon.prompts.concept_comparison",
            Prompt {
                description: "Compare two concepts: their shared ground, their differences, and how they connect.",
                template: "Compare the concepts '{concept1_id}' and '{concept2_id}'.",
                parameter_schema: json!({
                    "type": "object",
                    "properties": {
                        "concept1_id": {"type": "string"},
                        "concept2_id": {"type": "string"},
                    },
                    "required": ["concept1_id", "concept2_id"],
                }),
                usage_examples: vec![json!({"concept1_id": "feedback_loop", "concept2_id": "homeostasis"})],
                handler: Box::new(|engine, params| {
                    let id1 = required_str(params, "concept1_id")?;
                    let id2 = required_str(params, "concept2_id")?;
                    let entity1 = engine.query_entity(id1).map_err(|e| e.to_string())?;
                    let entity2 = engine.query_entity(id2).map_err(|e| e.to_string())?;
                    let paths = engine.find_paths(id1, id2, 3);
                    let label1 = entity1.get("label").and_then(|v| v.as_str()).unwrap_or(id1);
                    let label2 = entity2.get("label").and_then(|v| v.as_str()).unwrap_or(id2);
                    let prompt = format!(
                        "Compare the concepts '{label1}' and '{label2}'. {} path(s) connect them directly in the ontology.",
                        paths.len()
                    );
                    Ok((
                        prompt,
                        json!({ "concept1": entity1, "concept2": entity2, "paths": paths }),
                    ))
                }),
            },
        );

        catalog.insert(
            "cyberon.prompts.ontology_exploration",
            Prompt {
                description: "Explore the ontology starting from a topic: top search hits, outline matches, and a summary.",
                template: "Explore the ontology for the topic '{topic}'.",
                parameter_schema: json!({
                    "type": "object",
                    "properties": {"topic": {"type": "string"}},
                    "required": ["topic"],
                }),
                usage_examples: vec![json!({"topic": "feedback"})],
                handler: Box::new(|engine, params| {
                    let topic = required_str(params, "topic")?;
                    let mut hits = engine.search_entities(topic, None);
                    hits.truncate(5);
                    let summary = engine.generate_ontology_summary();
                    let mut sections = engine.find_section_by_topic(topic);
                    sections.truncate(3);
                    let prompt = format!(
                        "Explore the cybernetics ontology around the topic '{topic}', drawing on {} matching entit{} and {} matching outline section(s).",
                        hits.len(),
                        if hits.len() == 1 { "y" } else { "ies" },
                        sections.len()
                    );
                    Ok((
                        prompt,
                        json!({ "topic": topic, "entities": hits, "summary": summary, "sections": sections }),
                    ))
                }),
            },
        );

        catalog.insert(
            "cyberon.prompts.hierarchy_analysis",
            Prompt {
                description: "Analyze the root/depth hierarchy of the ontology, in full or scoped to one root concept.",
                template: "Analyze the concept hierarchy of the ontology.",
                parameter_schema: json!({
                    "type": "object",
                    "properties": {"root_concept_id": {"type": "string"}},
                }),
                usage_examples: vec![json!({}), json!({"root_concept_id": "systems_theory"})],
                handler: Box::new(|engine, params| {
                    let hierarchy = engine.analyze_concept_hierarchy().map_err(|e| e.to_string())?;
                    match optional_str(params, "root_concept_id") {
                        None => {
                            let root_count = hierarchy.get("root_nodes").and_then(|h| h.as_array()).map(Vec::len).unwrap_or(0);
                            let prompt = format!("Analyze the {root_count} root concept hierarchies of the cybernetics ontology.");
                            Ok((prompt, hierarchy))
                        }
                        Some(root_id) => {
                            let root = hierarchy
                                .get("root_nodes")
                                .and_then(|r| r.as_array())
                                .and_then(|rs| rs.iter().find(|r| r.get("id").and_then(|v| v.as_str()) == Some(root_id)))
                                .cloned()
                                .ok_or_else(|| format!("'{root_id}' is not a hierarchy root"))?;
                            let levels = hierarchy.get("hierarchies").and_then(|h| h.get(root_id)).cloned().unwrap_or(json!({}));
                            let depth = root.get("max_depth").cloned().unwrap_or(json!(0));
                            let prompt = format!("Analyze the hierarchy rooted at '{root_id}' (max depth {depth}).");
                            Ok((prompt, json!({ "root": root, "levels": levels })))
                        }
                    }
                }),
            },
        );

        catalog.insert(
            "cyberon.prompts.central_concepts",
            Prompt {
                description: "Survey the most central concepts in the ontology, grouped by entity type.",
                template: "List the most central concepts in the ontology.",
                parameter_schema: json!({
                    "type": "object",
                    "properties": {
                        "limit": {"type": "integer", "minimum": 1},
                        "entity_type": {"type": "string"},
                    },
                }),
                usage_examples: vec![json!({"limit": 5})],
                handler: Box::new(|engine, params| {
                    let limit = optional_usize(params, "limit", 10);
                    let entity_type = optional_str(params, "entity_type");
                    let entities = engine.get_central_entities(limit, entity_type).map_err(|e| e.to_string())?;
                    let mut by_type: BTreeMap<String, Vec<Value>> = BTreeMap::new();
                    for entity in &entities {
                        by_type.entry(entity.entity_type.clone()).or_default().push(json!(entity));
                    }
                    let prompt = format!("Here are the {} most central concepts in the cybernetics ontology, grouped by type.", entities.len());
                    Ok((prompt, json!({ "by_type": by_type })))
                }),
            },
        );

        Self { engine, catalog }
    }

    pub fn list(&self) -> Value {
        let prompts: Vec<Value> = self
            .catalog
            .iter()
            .map(|(name, prompt)| {
                json!({
                    "name": name,
                    "description": prompt.description,
                    "template": prompt.template,
                    "parameter_schema": prompt.parameter_schema,
                    "usage_examples": prompt.usage_examples,
                })
            })
            .collect();
        json!({ "prompts": prompts })
    }

    pub async fn get(&self, name: &str, params: &Value) -> Result<Value, DispatchError> {
        let prompt = self
            .catalog
            .get(name)
            .ok_or_else(|| DispatchError::InvalidParams(format!("Unknown prompt: {name}")))?;
        let engine = self.engine.read().await;
        let (text, context) = match (prompt.handler)(&engine, params) {
            Ok((text, context)) => (text, context),
            Err(message) => return Ok(envelope(name, Value::String(String::new()), json!({ "error": message }))),
        };
        Ok(envelope(name, Value::String(text), context))
    }
}

fn envelope(name: &str, prompt: Value, context: Value) -> Value {
    json!({
        "name": name,
        "timestamp": render_timestamp(Utc::now()),
        "prompt": prompt,
        "context": context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    async fn sample() -> PromptRegistry {
        let mut engine = QueryEngine::empty();
        engine.create_entity(None, "Feedback Loop", "concept", None, None, Map::new()).unwrap();
        engine.create_entity(None, "Homeostasis", "concept", None, None, Map::new()).unwrap();
        engine
            .create_relationship("feedback_loop", "homeostasis", "enables", Map::new())
            .unwrap();
        PromptRegistry::new(Arc::new(RwLock::new(engine)))
    }

    #[tokio::test]
    async fn entity_analysis_assembles_context() {
        let registry = sample().await;
        let result = registry.get("cyberon.prompts.entity_analysis", &json!({"entity_id": "feedback_loop"})).await.unwrap();
        assert!(result["prompt"].as_str().unwrap().contains("Feedback Loop"));
        assert!(result["context"]["relationships"].as_array().unwrap().iter().any(|s| s.as_str().unwrap().starts_with("enables")));
    }

    #[tokio::test]
    async fn unknown_prompt_is_invalid_params() {
        let registry = sample().await;
        let err = registry.get("cyberon.prompts.nope", &json!({})).await.unwrap_err();
        assert_eq!(err.code(), crate::protocol::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn missing_param_surfaces_as_error_context() {
        let registry = sample().await;
        let result = registry.get("cyberon.prompts.entity_analysis", &json!({})).await.unwrap();
        assert!(result["context"]["error"].is_string());
    }

    #[tokio::test]
    async fn hierarchy_analysis_without_root_covers_all() {
        let registry = sample().await;
        let result = registry.get("cyberon.prompts.hierarchy_analysis", &json!({})).await.unwrap();
        assert!(result["context"]["hierarchies"].is_array());
    }
}
