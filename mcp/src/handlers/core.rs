//! `initialize` and `server/capabilities`.

use serde_json::{json, Value};

use crate::dispatcher::{HandlerResult, SharedState};
use crate::protocol::Capabilities;

pub async fn initialize(params: Value, _transport_id: String, _state: SharedState) -> HandlerResult {
    let client_name = params
        .get("client_info")
        .and_then(|c| c.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown Client");
    let client_version = params
        .get("client_info")
        .and_then(|c| c.get("version"))
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown Version");
    tracing::info!(client_name, client_version, "client negotiated protocol version");

    let capabilities = Capabilities::default();
    let mut result = serde_json::to_value(&capabilities).map_err(|e| crate::error::DispatchError::Internal(e.to_string()))?;
    result
        .as_object_mut()
        .expect("Capabilities serializes to an object")
        .insert("instructions".into(), json!(crate::protocol::SERVER_INSTRUCTIONS.trim()));
    Ok(result)
}

pub async fn capabilities(_params: Value, _transport_id: String, _state: SharedState) -> HandlerResult {
    serde_json::to_value(Capabilities::default()).map_err(|e| crate::error::DispatchError::Internal(e.to_string()))
}
