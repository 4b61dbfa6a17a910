//! Transport abstraction: a scoped connection carrying line-delimited UTF-8
//! JSON messages between a client and the [`Dispatcher`]. Two concrete
//! bindings live alongside this module — [`stdio::StandardStream`]
//! (cooperative async, one reader task per transport) and
//! [`named_pipe::NamedPipe`] (blocking, one OS thread per transport).
//!
//! Lifecycle is bracketed: `start` acquires the underlying channels and
//! begins reading; `stop` guarantees release on every path and is
//! idempotent. Each transport carries a unique id, passed to
//! [`Dispatcher::handle_message`] so sessions can be keyed per connection.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::dispatcher::Dispatcher;

pub mod named_pipe;
pub mod stdio;

pub use named_pipe::NamedPipe;
pub use stdio::StandardStream;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} exists but is not a FIFO")]
    NotAFifo(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn id(&self) -> &str;

    async fn start(&self, dispatcher: Arc<Dispatcher>) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;
}
