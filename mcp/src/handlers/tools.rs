//! `tools/*` handlers: thin adapters from the JSON-RPC params object to
//! [`crate::tools::ToolRegistry`].

use serde_json::{json, Value};

use crate::dispatcher::{HandlerResult, SharedState};
use crate::error::DispatchError;

pub async fn list(_params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    Ok(state.tools.list())
}

pub async fn schema(params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DispatchError::InvalidParams("'name' is required".to_string()))?;
    Ok(state.tools.schema(name))
}

pub async fn execute(params: Value, _transport_id: String, state: SharedState) -> HandlerResult {
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DispatchError::InvalidParams("'name' is required".to_string()))?;
    let tool_params = params.get("params").cloned().unwrap_or_else(|| json!({}));
    state.tools.execute(name, &tool_params).await
}
