//! Blocking, thread-based binding over two FIFOs on the filesystem.
//!
//! A dedicated worker thread blocks on `open`/`read_line`/`write`, which is
//! why this binding lives on its own OS thread rather than inside the
//! tokio runtime: none of those calls are cancellable or non-blocking.
//! [`tokio::runtime::Handle::block_on`] is used to call back into the
//! (async) dispatcher from that thread.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::{Transport, TransportError};
use crate::dispatcher::Dispatcher;

const PIPE_REOPEN_DELAY: Duration = Duration::from_secs(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_IN_PATH: &str = "/run/cyberon/mcp_in.pipe";
pub const DEFAULT_OUT_PATH: &str = "/run/cyberon/mcp_out.pipe";

/// A stop flag whose setter wakes anyone blocked in [`StopSignal::wait_timeout`],
/// so the reconnect delay (step 5 of the reopen loop) is interruptible
/// instead of sleeping out the full [`PIPE_REOPEN_DELAY`].
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn new(stopped: bool) -> Self {
        Self {
            stopped: Mutex::new(stopped),
            condvar: Condvar::new(),
        }
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap()
    }

    fn set(&self, stopped: bool) -> bool {
        let mut guard = self.stopped.lock().unwrap();
        let previous = *guard;
        *guard = stopped;
        self.condvar.notify_all();
        previous
    }

    /// Sleeps for `timeout` or until stopped, whichever comes first.
    /// Returns `true` if the stop flag is set on return.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.stopped.lock().unwrap();
        let (guard, _) = self.condvar.wait_timeout_while(guard, timeout, |stopped| !*stopped).unwrap();
        *guard
    }
}

fn ensure_fifo(path: &Path) -> Result<(), TransportError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => Ok(()),
        Ok(_) => Err(TransportError::NotAFifo(path.display().to_string())),
        Err(_) => {
            mkfifo(path, Mode::from_bits_truncate(0o666))
                .map_err(|e| TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            Ok(())
        }
    }
}

pub struct NamedPipe {
    id: String,
    in_path: PathBuf,
    out_path: PathBuf,
    stop: Arc<StopSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NamedPipe {
    pub fn new(id: impl Into<String>, in_path: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            in_path: in_path.into(),
            out_path: out_path.into(),
            stop: Arc::new(StopSignal::new(true)),
            worker: Mutex::new(None),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stop.is_stopped() && self.worker.lock().unwrap().is_none()
    }
}

#[async_trait]
impl Transport for NamedPipe {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self, dispatcher: Arc<Dispatcher>) -> Result<(), TransportError> {
        ensure_fifo(&self.in_path)?;
        ensure_fifo(&self.out_path)?;

        self.stop.set(false);
        let stop = self.stop.clone();
        let transport_id = self.id.clone();
        let in_path = self.in_path.clone();
        let out_path = self.out_path.clone();
        let runtime = Handle::current();

        let handle = std::thread::Builder::new()
            .name(format!("named-pipe-{transport_id}"))
            .spawn(move || named_pipe_loop(transport_id, in_path, out_path, stop, runtime, dispatcher))
            .map_err(TransportError::Io)?;

        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if self.stop.set(true) {
            return Ok(());
        }

        // The worker may be blocked in `open()` waiting for a peer; nudge
        // both ends so it observes the stop flag on its next loop instead
        // of waiting indefinitely for a real client.
        let _ = OpenOptions::new().write(true).open(&self.in_path);
        let _ = File::open(&self.out_path);

        if let Some(handle) = self.worker.lock().unwrap().take() {
            let joined = tokio::time::timeout(JOIN_TIMEOUT, tokio::task::spawn_blocking(move || handle.join())).await;
            match joined {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(_))) => warn!(transport_id = %self.id, "named pipe worker panicked"),
                Ok(Err(_)) => warn!(transport_id = %self.id, "named pipe worker join task failed"),
                Err(_) => warn!(transport_id = %self.id, "named pipe worker did not stop within the timeout; abandoning"),
            }
        }
        Ok(())
    }
}

fn named_pipe_loop(
    transport_id: String,
    in_path: PathBuf,
    out_path: PathBuf,
    stop: Arc<StopSignal>,
    runtime: Handle,
    dispatcher: Arc<Dispatcher>,
) {
    while !stop.is_stopped() {
        let reader = match File::open(&in_path) {
            Ok(f) => f,
            Err(e) => {
                warn!(transport_id, error = %e, "failed to open pipe for reading");
                if stop.wait_timeout(PIPE_REOPEN_DELAY) {
                    break;
                }
                continue;
            }
        };
        let mut writer = match OpenOptions::new().write(true).open(&out_path) {
            Ok(f) => f,
            Err(e) => {
                warn!(transport_id, error = %e, "failed to open pipe for writing");
                if stop.wait_timeout(PIPE_REOPEN_DELAY) {
                    break;
                }
                continue;
            }
        };

        let mut lines = BufReader::new(reader).lines();
        loop {
            if stop.is_stopped() {
                break;
            }
            match lines.next() {
                Some(Ok(raw)) if !raw.trim().is_empty() => {
                    let response = runtime.block_on(dispatcher.handle_message(&raw, &transport_id));
                    if let Some(response) = response {
                        if let Err(e) = writeln!(writer, "{response}").and_then(|_| writer.flush()) {
                            warn!(transport_id, error = %e, "named pipe write failed, closing");
                            break;
                        }
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(transport_id, error = %e, "named pipe read error, closing");
                    break;
                }
                None => {
                    debug!(transport_id, "named pipe reached end-of-stream, closing");
                    break;
                }
            }
        }

        drop(lines);
        drop(writer);

        if stop.wait_timeout(PIPE_REOPEN_DELAY) {
            break;
        }
    }
    info!(transport_id, "named pipe worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_path_that_exists_but_is_not_a_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_fifo");
        std::fs::write(&path, b"hello").unwrap();
        let err = ensure_fifo(&path).unwrap_err();
        assert!(matches!(err, TransportError::NotAFifo(_)));
    }

    #[test]
    fn creates_a_fifo_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.pipe");
        ensure_fifo(&path).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[tokio::test]
    async fn a_never_started_transport_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = NamedPipe::new("pipe-1", dir.path().join("in"), dir.path().join("out"));
        assert!(transport.is_closed());
        transport.stop().await.unwrap();
        transport.stop().await.unwrap();
    }
}
