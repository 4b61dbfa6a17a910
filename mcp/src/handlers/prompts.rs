//! `prompts/*` handlers: thin adapters from the JSON-RPC params object to
//! [`crate::prompts::PromptRegistry`].

use serde_json::{json, Value};

use crate::dispatcher::{HandlerResult, SharedState};
use crate::error::DispatchError;

pub async fn list(_params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    Ok(state.prompts.list())
}

pub async fn get(params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DispatchError::InvalidParams("'name' is required".to_string()))?;
    let prompt_params = params.get("params").cloned().unwrap_or_else(|| json!({}));
    state.prompts.get(name, &prompt_params).await
}
