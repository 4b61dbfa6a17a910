//! `resources/*` handlers: thin adapters from the JSON-RPC params object to
//! [`crate::resources::ResourceRegistry`].

use serde_json::Value;

use crate::dispatcher::{HandlerResult, SharedState};
use crate::error::DispatchError;

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, DispatchError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DispatchError::InvalidParams(format!("'{key}' is required")))
}

pub async fn list(_params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    Ok(state.resources.list().await)
}

pub async fn templates_list(_params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    Ok(state.resources.templates())
}

pub async fn read(params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    let uri = required_str(&params, "uri")?;
    state.resources.read(uri).await
}

pub async fn subscribe(params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    state.resources.subscribe(params.get("uri").and_then(|v| v.as_str()))
}

pub async fn unsubscribe(params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    state.resources.unsubscribe(params.get("uri").and_then(|v| v.as_str()))
}
