//! `cyberon/*` query methods: thin wrappers around [`cyberon_core::QueryEngine`]
//! that additionally update per-transport session recency state. Every
//! handler here catches engine errors and folds them into the successful
//! result payload as `{"error": message}` rather than raising a dispatcher
//! error — these are read/browse endpoints, not validated mutations.

use serde_json::{json, Value};

use crate::dispatcher::{HandlerResult, SharedState};
use crate::error::DispatchError;

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, DispatchError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DispatchError::InvalidParams(format!("'{key}' is required")))
}

fn optional_usize(params: &Value, key: &str, default: usize) -> usize {
    params.get(key).and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(default)
}

fn optional_str_list(params: &Value, key: &str) -> Option<Vec<String>> {
    params.get(key)?.as_array().map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
}

pub async fn search(params: Value, transport_id: String, state: SharedState) -> HandlerResult {
    let query = params.get("query").and_then(|v| v.as_str()).unwrap_or("");
    let limit = optional_usize(&params, "limit", 10);

    if query.is_empty() {
        return Ok(json!({ "entities": [], "message": "Empty query" }));
    }

    state.sessions.with_session(&transport_id, |session| session.note_search(query)).await;

    let entity_types = optional_str_list(&params, "entity_types");
    let engine = state.engine.read().await;
    let mut results = engine.search_entities(query, entity_types.as_deref());
    results.truncate(limit);

    Ok(json!({
        "entities": results,
        "query": query,
        "total": results.len(),
    }))
}

pub async fn entity(params: Value, transport_id: String, state: SharedState) -> HandlerResult {
    let entity_id = required_str(&params, "entity_id")?;
    state.sessions.with_session(&transport_id, |session| session.note_entity(entity_id)).await;

    let engine = state.engine.read().await;
    match engine.query_entity(entity_id) {
        Ok(entity) => Ok(entity),
        Err(e) => Ok(json!({ "error": e.to_string() })),
    }
}

pub async fn paths(params: Value, transport_id: String, state: SharedState) -> HandlerResult {
    let source_id = required_str(&params, "source_id")?.to_string();
    let target_id = required_str(&params, "target_id")?.to_string();
    let max_length = optional_usize(&params, "max_length", 3);

    state.sessions.with_session(&transport_id, |session| session.note_path(&source_id, &target_id)).await;

    let engine = state.engine.read().await;
    let found_paths = engine.find_paths(&source_id, &target_id, max_length);
    let count = found_paths.len();
    let source = engine.query_entity(&source_id).unwrap_or_else(|e| json!({ "error": e.to_string() }));
    let target = engine.query_entity(&target_id).unwrap_or_else(|e| json!({ "error": e.to_string() }));

    Ok(json!({
        "paths": found_paths,
        "source": source,
        "target": target,
        "count": count,
    }))
}

pub async fn connections(params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    let entity_id = required_str(&params, "entity_id")?;
    let max_distance = optional_usize(&params, "max_distance", 2);

    let engine = state.engine.read().await;
    match engine.find_connections(entity_id, max_distance) {
        Ok(shells) => {
            let entity = engine.query_entity(entity_id).unwrap_or_else(|e| json!({ "error": e.to_string() }));
            Ok(json!({ "connections": shells, "entity": entity }))
        }
        Err(e) => Ok(json!({ "error": e.to_string() })),
    }
}

pub async fn entity_types(_params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    let engine = state.engine.read().await;
    Ok(json!({ "types": engine.get_entity_types() }))
}

pub async fn relationship_types(_params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    let engine = state.engine.read().await;
    Ok(json!({ "types": engine.get_relationship_types() }))
}
