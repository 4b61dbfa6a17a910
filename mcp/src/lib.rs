//! # cyberon-mcp
//!
//! The JSON-RPC 2.0 Model Context Protocol surface over [`cyberon_core::QueryEngine`]:
//! envelope parsing and method routing ([`dispatcher`]), the three extension
//! registries ([`resources`], [`tools`], [`prompts`]), per-transport [`session`]
//! state, and the [`server`] that wires a chosen set of transports to all of
//! the above.

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use dispatcher::{Dispatcher, SharedState};
pub use error::DispatchError;
pub use server::Server;
