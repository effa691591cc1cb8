//! Purpose: Drain the multiplexed tdjson event stream and route each event to its client.
//! Exports: `ReceiveLoop`.
//! Role: The single consumer of `NativeSurface::receive`; runs on one dedicated thread.
//! Invariants: At most one loop thread runs at a time (guarded by the registry's flag).
//! Invariants: The loop stops itself when a turn starts with an empty registry; there is
//! no external stop signal.
//! Invariants: Malformed events, unknown ids, native receive errors, and panicking
//! handlers never end the loop.
//! Notes: Per-client delivery order equals native emission order (one consumer, in order).
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::core::envelope::Envelope;
use crate::core::error::{Error, ErrorKind};
use crate::core::native::NativeSurface;
use crate::core::registry::{ClientHandle, DispatchRegistry};

const THREAD_NAME: &str = "tdlbind-receive";
const ERROR_BACKOFF: Duration = Duration::from_millis(100);
const JOIN_POLL: Duration = Duration::from_millis(5);

pub struct ReceiveLoop {
    native: Arc<dyn NativeSurface>,
    registry: Arc<DispatchRegistry>,
    timeout: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReceiveLoop {
    pub fn new(
        native: Arc<dyn NativeSurface>,
        registry: Arc<DispatchRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            native,
            registry,
            timeout,
            worker: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.registry.loop_running()
    }

    /// Registers `handle`, starting the loop if it is stopped.
    pub fn attach(&self, handle: Arc<dyn ClientHandle>) -> Result<(), Error> {
        if self.registry.register(handle) {
            self.spawn()?;
        }
        Ok(())
    }

    fn spawn(&self) -> Result<(), Error> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        // A previous worker has already seen an empty registry and is exiting.
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }

        let native = Arc::clone(&self.native);
        let registry = Arc::clone(&self.registry);
        let timeout = self.timeout;
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(native.as_ref(), &registry, timeout));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.registry.abort_loop_start();
                Err(Error::new(ErrorKind::Io)
                    .with_message("failed to spawn receive loop thread")
                    .with_source(err))
            }
        }
    }

    /// Waits for the loop thread to exit while the registry stays empty.
    ///
    /// Returns `false` as soon as a client is attached during the wait; that client
    /// keeps the loop alive until it is closed. Returns `true` once no worker is left.
    pub fn join_idle(&self) -> bool {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let finished = match worker.as_ref() {
                None => return self.registry.is_empty(),
                Some(handle) => handle.is_finished(),
            };
            if finished {
                if let Some(handle) = worker.take() {
                    if handle.join().is_err() {
                        tracing::warn!("receive loop thread panicked");
                    }
                }
            } else if !self.registry.is_empty() {
                return false;
            } else {
                thread::sleep(JOIN_POLL);
            }
        }
    }
}

struct ReleaseOnPanic<'a>(&'a DispatchRegistry);

impl Drop for ReleaseOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.finish_turn(None);
            self.0.abort_loop_start();
        }
    }
}

fn run(native: &dyn NativeSurface, registry: &DispatchRegistry, timeout: Duration) {
    let _guard = ReleaseOnPanic(registry);
    tracing::debug!("starting receive loop");

    while registry.begin_turn() {
        let envelope = match native.receive(timeout) {
            Ok(None) => {
                tracing::trace!("receive loop: empty response");
                None
            }
            Ok(Some(raw)) => match Envelope::parse(&raw) {
                Ok(envelope) => Some(envelope),
                Err(err) => {
                    tracing::warn!(error = %err, "receive loop: dropping malformed event");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "receive loop: native receive failed");
                registry.finish_turn(None);
                thread::sleep(ERROR_BACKOFF.min(timeout));
                continue;
            }
        };

        let target = envelope.as_ref().and_then(|envelope| envelope.client_id);
        let handle = registry.finish_turn(target);
        match (envelope, handle) {
            (Some(envelope), Some(handle)) => dispatch(handle.as_ref(), envelope.payload),
            (Some(envelope), None) => match envelope.client_id {
                Some(client_id) => {
                    tracing::debug!(%client_id, "receive loop: no such client, dropping event")
                }
                None => tracing::debug!("receive loop: event without client id, dropping"),
            },
            (None, _) => {}
        }
    }

    tracing::debug!("stopping receive loop");
}

fn dispatch(handle: &dyn ClientHandle, payload: Map<String, Value>) {
    let client_id = handle.client_id();
    if catch_unwind(AssertUnwindSafe(|| handle.handle_receive(payload))).is_err() {
        tracing::warn!(%client_id, "receive loop: client handler panicked, event dropped");
    }
}
