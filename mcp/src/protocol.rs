//! JSON-RPC 2.0 envelope types.
//!
//! Methods are untyped JSON-RPC: `params`/`result` are bare [`Value`]s rather
//! than a fixed request/response enum, matching the MCP wire format.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// A parsed-but-not-yet-validated inbound message. `id` defaults to `Null`
/// so that a missing field and an explicit `null` are indistinguishable —
/// both mean "this is a notification".
#[derive(Debug, Deserialize)]
pub struct RawRequest {
    #[serde(default)]
    pub jsonrpc: Value,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: Value,
    #[serde(default)]
    pub params: Value,
}

impl RawRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }

    pub fn method_name(&self) -> Option<&str> {
        self.method.as_str()
    }

    pub fn params_object(&self) -> Value {
        if self.params.is_object() {
            self.params.clone()
        } else {
            Value::Object(Map::new())
        }
    }
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub fn error_response(id: Value, code: i64, message: impl Into<String>, data: Option<Value>) -> Value {
    let mut error = Map::new();
    error.insert("code".into(), json!(code));
    error.insert("message".into(), Value::String(message.into()));
    if let Some(data) = data {
        error.insert("data".into(), data);
    }
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": Value::Object(error),
    })
}

/// Built-in JSON-RPC error response for requests that failed to parse at
/// all — there is no request `id` to echo, so the response always carries
/// `id: null` per the spec.
pub fn parse_error_response(message: impl Into<String>) -> Value {
    error_response(Value::Null, PARSE_ERROR, message, None)
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub vendor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Supports {
    pub resources: bool,
    pub tools: bool,
    pub prompts: bool,
}

/// The capability record returned by `initialize` and `server/capabilities`.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    pub supports: Supports,
}

pub const PROTOCOL_VERSION: &str = "0.5.0";

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: ServerInfo {
                name: "CYBERON MCP Server".to_string(),
                version: "0.1.0".to_string(),
                vendor: "CYBERON Project".to_string(),
            },
            supports: Supports {
                resources: true,
                tools: true,
                prompts: true,
            },
        }
    }
}

/// Instruction blurb returned alongside `initialize`'s capability record,
/// enumerating the registered method surface for a client's first contact.
pub const SERVER_INSTRUCTIONS: &str = "\
This server exposes a cybernetics ontology graph over JSON-RPC 2.0.

Query methods: cyberon/search, cyberon/entity, cyberon/paths, cyberon/connections,
cyberon/entity_types, cyberon/relationship_types.

Resources: resources/list, resources/templates/list, resources/read,
resources/subscribe, resources/unsubscribe (browse the graph via cyberon:// URIs).

Tools: tools/list, tools/schema, tools/execute (run a named analysis over the graph).

Prompts: prompts/list, prompts/get (assemble natural-language context for an LLM).
";
