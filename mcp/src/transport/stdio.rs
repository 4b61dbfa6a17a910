//! Cooperative-async binding over stdin/stdout.
//!
//! A single background task owns the reader; it invokes the dispatcher per
//! non-empty line and, if a response is produced, writes it back through
//! the shared writer before yielding. The writer is shared (not
//! task-local) so [`StandardStream::send`] can be exercised directly, e.g.
//! from tests, without going through a live stdin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Transport, TransportError};
use crate::dispatcher::Dispatcher;

async fn write_line(stdout: &mut tokio::io::Stdout, message: &str) -> std::io::Result<()> {
    stdout.write_all(message.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

pub struct StandardStream {
    id: String,
    closed: Arc<AtomicBool>,
    writer: Arc<Mutex<Option<tokio::io::Stdout>>>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StandardStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            closed: Arc::new(AtomicBool::new(true)),
            writer: Arc::new(Mutex::new(None)),
            stop_tx: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write one framed message. Fails with [`TransportError::Closed`] once
    /// end-of-stream, a stop request, or a broken output pipe has closed
    /// the transport.
    pub async fn send(&self, message: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut guard = self.writer.lock().await;
        let Some(stdout) = guard.as_mut() else {
            return Err(TransportError::Closed);
        };
        if let Err(e) = write_line(stdout, message).await {
            *guard = None;
            self.closed.store(true, Ordering::SeqCst);
            return Err(TransportError::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for StandardStream {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self, dispatcher: Arc<Dispatcher>) -> Result<(), TransportError> {
        *self.writer.lock().await = Some(tokio::io::stdout());
        self.closed.store(false, Ordering::SeqCst);

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.stop_tx.lock().await = Some(stop_tx);

        let transport_id = self.id.clone();
        let closed = self.closed.clone();
        let writer = self.writer.clone();

        let handle = tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut lines = BufReader::new(stdin).lines();

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!(transport_id, "stdio reader received stop signal");
                        break;
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(raw)) if !raw.trim().is_empty() => {
                                if let Some(response) = dispatcher.handle_message(&raw, &transport_id).await {
                                    let mut guard = writer.lock().await;
                                    if let Some(stdout) = guard.as_mut() {
                                        if let Err(e) = write_line(stdout, &response).await {
                                            warn!(transport_id, error = %e, "stdio write failed, closing transport");
                                            *guard = None;
                                            drop(guard);
                                            break;
                                        }
                                    }
                                }
                            }
                            Ok(Some(_)) => {}
                            Ok(None) => {
                                info!(transport_id, "stdin reached end-of-stream");
                                break;
                            }
                            Err(e) => {
                                warn!(transport_id, error = %e, "stdin read error");
                                break;
                            }
                        }
                        tokio::task::yield_now().await;
                    }
                }
            }

            closed.store(true, Ordering::SeqCst);
            *writer.lock().await = None;
            info!(transport_id, "stdio transport closed");
        });

        *self.reader.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.reader.lock().await.take() {
            let _ = handle.await;
        }
        *self.writer.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_closed_before_start_is_called() {
        let transport = StandardStream::new("stdio-1");
        assert!(transport.is_closed());
        let err = transport.send("{}").await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn stop_is_idempotent_on_a_never_started_transport() {
        let transport = StandardStream::new("stdio-1");
        transport.stop().await.unwrap();
        transport.stop().await.unwrap();
        assert!(transport.is_closed());
    }
}
