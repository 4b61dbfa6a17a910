//! The JSON-RPC dispatcher: a method-name → handler registry plus the
//! envelope parsing and error-mapping rules from the protocol spec.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use cyberon_core::QueryEngine;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::error::DispatchError;
use crate::prompts::PromptRegistry;
use crate::protocol::{self, RawRequest};
use crate::resources::ResourceRegistry;
use crate::session::SessionStore;
use crate::tools::ToolRegistry;

pub type HandlerResult = Result<Value, DispatchError>;

/// State shared by every handler: the single engine (behind a
/// readers-writer lock per the concurrency model), the process-wide
/// session map, and the three extension registries.
#[derive(Clone)]
pub struct SharedState {
    pub engine: Arc<RwLock<QueryEngine>>,
    pub sessions: Arc<SessionStore>,
    pub resources: Arc<ResourceRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub prompts: Arc<PromptRegistry>,
}

impl SharedState {
    pub fn new(engine: QueryEngine) -> Self {
        let engine = Arc::new(RwLock::new(engine));
        Self {
            engine: engine.clone(),
            sessions: Arc::new(SessionStore::new()),
            resources: Arc::new(ResourceRegistry::new(engine.clone())),
            tools: Arc::new(ToolRegistry::new(engine.clone())),
            prompts: Arc::new(PromptRegistry::new(engine)),
        }
    }
}

#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, params: Value, transport_id: &str, state: &SharedState) -> HandlerResult;
}

/// Adapts a plain async function into a [`MethodHandler`], so registering a
/// method is just `dispatcher.register("name", fn_handler(my_async_fn))`.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Value, String, SharedState) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, params: Value, transport_id: &str, state: &SharedState) -> HandlerResult {
        (self.0)(params, transport_id.to_string(), state.clone()).await
    }
}

pub fn fn_handler<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value, String, SharedState) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    FnHandler(f)
}

/// Single entry point: parses a raw JSON-RPC message, routes it to the
/// registered handler, and returns the reply to send (or `None` for a
/// notification). The registered method set is fixed once [`Dispatcher::new`]
/// has finished assembling the server.
pub struct Dispatcher {
    methods: HashMap<String, Arc<dyn MethodHandler>>,
    state: SharedState,
}

impl Dispatcher {
    pub fn new(state: SharedState) -> Self {
        Self {
            methods: HashMap::new(),
            state,
        }
    }

    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        self.methods.insert(method.to_string(), Arc::new(handler));
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Handle one line of input. Returns `None` for notifications (no `id`
    /// or `id: null`); everything else returns `Some(reply)`.
    pub async fn handle_message(&self, raw: &str, transport_id: &str) -> Option<String> {
        let request: RawRequest = match serde_json::from_str(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(transport_id, error = %e, "failed to parse JSON-RPC message");
                return Some(protocol::parse_error_response(e.to_string()).to_string());
            }
        };

        if request.jsonrpc.as_str() != Some("2.0") {
            let response = protocol::error_response(
                request.id.clone(),
                protocol::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
                None,
            );
            return if request.is_notification() { None } else { Some(response.to_string()) };
        }

        let Some(method) = request.method_name() else {
            let response = protocol::error_response(
                request.id.clone(),
                protocol::INVALID_REQUEST,
                "Invalid Request: missing method",
                None,
            );
            return if request.is_notification() { None } else { Some(response.to_string()) };
        };

        debug!(transport_id, method, "dispatching request");

        let Some(handler) = self.methods.get(method) else {
            let response = protocol::error_response(
                request.id.clone(),
                protocol::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
                None,
            );
            return if request.is_notification() { None } else { Some(response.to_string()) };
        };

        let result = handler.handle(request.params_object(), transport_id, &self.state).await;

        if request.is_notification() {
            if let Err(e) = result {
                error!(transport_id, method, error = %e, "notification handler failed");
            }
            return None;
        }

        let response = match result {
            Ok(value) => protocol::success_response(request.id, value),
            Err(e) => {
                error!(transport_id, method, error = %e, "handler failed");
                protocol::error_response(request.id, e.code(), e.message(), Some(Value::String(e.data())))
            }
        };
        Some(response.to_string())
    }
}
