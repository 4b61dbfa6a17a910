//! Server assembly: wires the dispatcher, the three extension registries,
//! and a chosen set of transports around a single [`QueryEngine`].
//!
//! The set of registered JSON-RPC methods is fixed once [`Server::new`]
//! returns; transports are added afterward and only begin reading once
//! [`Server::start`] is called.

use std::collections::HashMap;
use std::sync::Arc;

use cyberon_core::QueryEngine;
use tokio::sync::RwLock;
use tracing::info;

use crate::dispatcher::{Dispatcher, SharedState};
use crate::handlers;
use crate::transport::{Transport, TransportError};

pub struct Server {
    dispatcher: Arc<Dispatcher>,
    transports: RwLock<HashMap<String, Arc<dyn Transport>>>,
}

impl Server {
    /// Build a [`Dispatcher`] with every `initialize`, `cyberon/*`,
    /// `resources/*`, `tools/*`, and `prompts/*` method registered against a
    /// fresh [`SharedState`] over `engine`.
    pub fn new(engine: QueryEngine) -> Self {
        let state = SharedState::new(engine);
        let mut dispatcher = Dispatcher::new(state);

        dispatcher.register("initialize", crate::dispatcher::fn_handler(handlers::core::initialize));
        dispatcher.register("server/capabilities", crate::dispatcher::fn_handler(handlers::core::capabilities));

        dispatcher.register("cyberon/search", crate::dispatcher::fn_handler(handlers::query::search));
        dispatcher.register("cyberon/entity", crate::dispatcher::fn_handler(handlers::query::entity));
        dispatcher.register("cyberon/paths", crate::dispatcher::fn_handler(handlers::query::paths));
        dispatcher.register("cyberon/connections", crate::dispatcher::fn_handler(handlers::query::connections));
        dispatcher.register("cyberon/entity_types", crate::dispatcher::fn_handler(handlers::query::entity_types));
        dispatcher.register("cyberon/relationship_types", crate::dispatcher::fn_handler(handlers::query::relationship_types));

        dispatcher.register("resources/list", crate::dispatcher::fn_handler(handlers::resources::list));
        dispatcher.register("resources/templates/list", crate::dispatcher::fn_handler(handlers::resources::templates_list));
        dispatcher.register("resources/read", crate::dispatcher::fn_handler(handlers::resources::read));
        dispatcher.register("resources/subscribe", crate::dispatcher::fn_handler(handlers::resources::subscribe));
        dispatcher.register("resources/unsubscribe", crate::dispatcher::fn_handler(handlers::resources::unsubscribe));

        dispatcher.register("tools/list", crate::dispatcher::fn_handler(handlers::tools::list));
        dispatcher.register("tools/schema", crate::dispatcher::fn_handler(handlers::tools::schema));
        dispatcher.register("tools/execute", crate::dispatcher::fn_handler(handlers::tools::execute));

        dispatcher.register("prompts/list", crate::dispatcher::fn_handler(handlers::prompts::list));
        dispatcher.register("prompts/get", crate::dispatcher::fn_handler(handlers::prompts::get));

        Self {
            dispatcher: Arc::new(dispatcher),
            transports: RwLock::new(HashMap::new()),
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub async fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.transports.write().await.insert(transport.id().to_string(), transport);
    }

    /// Start every registered transport. A transport that fails to start
    /// does not prevent the others from starting; its error is returned
    /// alongside its id.
    pub async fn start(&self) -> Vec<(String, TransportError)> {
        let transports = self.transports.read().await;
        let mut failures = Vec::new();
        for (id, transport) in transports.iter() {
            info!(transport_id = %id, "starting transport");
            if let Err(e) = transport.start(self.dispatcher.clone()).await {
                failures.push((id.clone(), e));
            }
        }
        failures
    }

    pub async fn stop(&self) {
        let transports = self.transports.read().await;
        for (id, transport) in transports.iter() {
            info!(transport_id = %id, "stopping transport");
            if let Err(e) = transport.stop().await {
                tracing::warn!(transport_id = %id, error = %e, "transport failed to stop cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_every_spec_method() {
        let server = Server::new(QueryEngine::empty());
        let expected = [
            "initialize",
            "server/capabilities",
            "cyberon/search",
            "cyberon/entity",
            "cyberon/paths",
            "cyberon/connections",
            "cyberon/entity_types",
            "cyberon/relationship_types",
            "resources/list",
            "resources/templates/list",
            "resources/read",
            "resources/subscribe",
            "resources/unsubscribe",
            "tools/list",
            "tools/schema",
            "tools/execute",
            "prompts/list",
            "prompts/get",
        ];
        for method in expected {
            let reply = server
                .dispatcher()
                .handle_message(&format!(r#"{{"jsonrpc":"2.0","id":1,"method":"{method}","params":{{}}}}"#), "t")
                .await
                .unwrap();
            assert!(!reply.contains("Method not found"), "{method} should be registered");
        }
    }

    #[tokio::test]
    async fn stop_with_no_transports_is_a_no_op() {
        let server = Server::new(QueryEngine::empty());
        server.stop().await;
    }
}
