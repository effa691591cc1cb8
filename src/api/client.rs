//! Purpose: Per-session client façade over either tdjson interface.
//! Exports: `Client`, `ClientOptions`.
//! Role: Implements the receive loop's consumer contract and the caller-facing request API.
//! Invariants: Inbound payloads are routed without blocking: pending `invoke` first, else updates.
//! Invariants: Disposal runs once; multiplexed clients leave the registry before native destroy.
//! Invariants: Closing drops the update sender; `next_update` never waits on a closed client.
//! Invariants: A legacy client's native handle is destroyed by its own poll thread, once.
#![allow(clippy::result_large_err)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::core::ClientId;
use crate::core::error::{Error, ErrorKind};
use crate::core::native::{LegacyHandle, NativeSurface};
use crate::core::receive_loop::ReceiveLoop;
use crate::core::registry::{ClientHandle, DispatchRegistry};
use crate::json::{parse, rename};

const EXTRA_KEY: &str = "@extra";
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClientOptions {
    /// Legacy interface only: overrides the configured receive timeout for this client.
    pub receive_timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }
}

enum Binding {
    Multiplexed {
        client_id: ClientId,
        registry: Arc<DispatchRegistry>,
    },
    Legacy {
        handle: LegacyHandle,
        stop: AtomicBool,
        poller: Mutex<Option<JoinHandle<()>>>,
    },
}

struct Inbox {
    /// `None` once the client is closed; queued updates still drain.
    updates_tx: Mutex<Option<Sender<Value>>>,
    updates_rx: Mutex<Receiver<Value>>,
    pending: Mutex<HashMap<u64, SyncSender<Value>>>,
    next_extra: AtomicU64,
}

impl Inbox {
    fn new() -> Self {
        let (updates_tx, updates_rx) = mpsc::channel();
        Self {
            updates_tx: Mutex::new(Some(updates_tx)),
            updates_rx: Mutex::new(updates_rx),
            pending: Mutex::new(HashMap::new()),
            next_extra: AtomicU64::new(1),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, SyncSender<Value>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, payload: Map<String, Value>) {
        let value = rename::from_engine(Value::Object(payload));
        let waiter = value
            .get(EXTRA_KEY)
            .and_then(Value::as_u64)
            .and_then(|extra| self.pending().remove(&extra));
        match waiter {
            Some(waiter) => {
                let _ = waiter.try_send(value);
            }
            None => {
                let updates = self.updates_tx.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(updates) = updates.as_ref() {
                    let _ = updates.send(value);
                }
            }
        }
    }

    /// Drops every waiter and the update sender so blocked `invoke` and
    /// `next_update` calls observe the close.
    fn disconnect(&self) {
        self.pending().clear();
        self.updates_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

struct ClientInner {
    native: Arc<dyn NativeSurface>,
    binding: Binding,
    inbox: Inbox,
    closed: AtomicBool,
}

impl ClientInner {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            let mut err = Error::new(ErrorKind::Usage).with_message("client is closed");
            if let Binding::Multiplexed { client_id, .. } = &self.binding {
                err = err.with_client_id(*client_id);
            }
            return Err(err);
        }
        Ok(())
    }

    fn send_raw(&self, request: &str) -> Result<(), Error> {
        match &self.binding {
            Binding::Multiplexed { client_id, .. } => self
                .native
                .send(*client_id, request)
                .map_err(|err| err.with_client_id(*client_id)),
            Binding::Legacy { handle, .. } => self.native.legacy_send(*handle, request),
        }
    }

    /// Only the first call does any work; later calls return `Ok`.
    fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let destroyed = match &self.binding {
            Binding::Multiplexed {
                client_id,
                registry,
            } => {
                tracing::debug!(%client_id, "closing client");
                registry.unregister(*client_id);
                self.native
                    .destroy(*client_id)
                    .map_err(|err| err.with_client_id(*client_id))
            }
            Binding::Legacy { stop, .. } => {
                tracing::debug!("closing legacy client");
                stop.store(true, Ordering::Release);
                Ok(())
            }
        };
        self.inbox.disconnect();
        destroyed
    }
}

/// Registry entry for a multiplexed client.
struct Routed {
    client_id: ClientId,
    inner: Arc<ClientInner>,
}

impl ClientHandle for Routed {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn handle_receive(&self, payload: Map<String, Value>) {
        self.inner.inbox.deliver(payload);
    }

    fn dispose(&self) {
        if let Err(err) = self.inner.close() {
            tracing::warn!(client_id = %self.client_id, error = %err, "client dispose failed");
        }
    }
}

pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub(crate) fn multiplexed(
        native: Arc<dyn NativeSurface>,
        receive_loop: &ReceiveLoop,
    ) -> Result<Self, Error> {
        let client_id = native.create_client_id()?;
        let inner = Arc::new(ClientInner {
            native,
            binding: Binding::Multiplexed {
                client_id,
                registry: Arc::clone(receive_loop.registry()),
            },
            inbox: Inbox::new(),
            closed: AtomicBool::new(false),
        });
        tracing::debug!(%client_id, "created client");
        let routed = Arc::new(Routed {
            client_id,
            inner: Arc::clone(&inner),
        });
        if let Err(err) = receive_loop.attach(routed) {
            if let Err(close_err) = inner.close() {
                tracing::warn!(%client_id, error = %close_err, "native destroy failed");
            }
            return Err(err.with_client_id(client_id));
        }
        Ok(Self { inner })
    }

    pub(crate) fn legacy(native: Arc<dyn NativeSurface>, timeout: Duration) -> Result<Self, Error> {
        let handle = native.legacy_create()?;
        let inner = Arc::new(ClientInner {
            native,
            binding: Binding::Legacy {
                handle,
                stop: AtomicBool::new(false),
                poller: Mutex::new(None),
            },
            inbox: Inbox::new(),
            closed: AtomicBool::new(false),
        });

        let poll_inner = Arc::clone(&inner);
        let spawned = thread::Builder::new()
            .name("tdlbind-legacy-poll".to_string())
            .spawn(move || poll_legacy(&poll_inner, handle, timeout));
        match spawned {
            Ok(poller) => {
                if let Binding::Legacy { poller: slot, .. } = &inner.binding {
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(poller);
                }
                Ok(Self { inner })
            }
            Err(err) => {
                inner.closed.store(true, Ordering::Release);
                inner.native.legacy_destroy(handle);
                Err(Error::new(ErrorKind::Io)
                    .with_message("failed to spawn legacy poll thread")
                    .with_source(err))
            }
        }
    }

    /// Native id; `None` for legacy clients.
    pub fn id(&self) -> Option<ClientId> {
        match &self.inner.binding {
            Binding::Multiplexed { client_id, .. } => Some(*client_id),
            Binding::Legacy { .. } => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Sends `request` without waiting; callers use `_` as the type key.
    pub fn send(&self, request: Value) -> Result<(), Error> {
        self.inner.ensure_open()?;
        let request = rename::to_engine(request).to_string();
        self.inner.send_raw(&request)
    }

    /// Sends `request` and waits for the response carrying the same `@extra`.
    pub fn invoke(&self, request: Value, timeout: Duration) -> Result<Value, Error> {
        self.inner.ensure_open()?;
        let Value::Object(mut request) = rename::to_engine(request) else {
            return Err(Error::new(ErrorKind::Usage).with_message("request must be a json object"));
        };
        let extra = self.inner.inbox.next_extra.fetch_add(1, Ordering::Relaxed);
        request.insert(EXTRA_KEY.to_string(), Value::from(extra));

        let (waiter, response) = mpsc::sync_channel(1);
        self.inner.inbox.pending().insert(extra, waiter);
        if let Err(err) = self.inner.send_raw(&Value::Object(request).to_string()) {
            self.inner.inbox.pending().remove(&extra);
            return Err(err);
        }

        match response.recv_timeout(timeout) {
            Ok(value) => match engine_error(&value) {
                Some(err) => Err(err),
                None => Ok(value),
            },
            Err(RecvTimeoutError::Timeout) => {
                self.inner.inbox.pending().remove(&extra);
                Err(Error::new(ErrorKind::Timeout)
                    .with_message(format!("no response within {}s", timeout.as_secs_f64())))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::new(ErrorKind::Usage).with_message("client closed before responding"))
            }
        }
    }

    /// Synchronous request that tdjson answers without a network round trip.
    pub fn execute(&self, request: Value) -> Result<Option<Value>, Error> {
        let request = rename::to_engine(request).to_string();
        let response = match &self.inner.binding {
            Binding::Multiplexed { .. } => self.inner.native.execute(&request)?,
            Binding::Legacy { handle, .. } => {
                self.inner.native.legacy_execute(Some(*handle), &request)?
            }
        };
        decode_response(response)
    }

    /// Next update (any event not answering a pending `invoke`), in arrival order.
    /// After close, returns the updates already queued and then `None` without waiting.
    pub fn next_update(&self, timeout: Duration) -> Option<Value> {
        let updates = self
            .inner
            .inbox
            .updates_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        updates.recv_timeout(timeout).ok()
    }

    pub fn try_next_update(&self) -> Option<Value> {
        let updates = self
            .inner
            .inbox
            .updates_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        updates.try_recv().ok()
    }

    /// Closes the client, reporting a failed native destroy. The client counts as
    /// closed either way, and later calls return `Ok`. For legacy clients this
    /// waits for the poll thread, which can take up to one receive timeout.
    pub fn try_close(&self) -> Result<(), Error> {
        let closed = self.inner.close();
        if let Binding::Legacy { poller, .. } = &self.inner.binding {
            let handle = poller.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    return closed.and(Err(
                        Error::new(ErrorKind::Internal).with_message("legacy poll thread panicked")
                    ));
                }
            }
        }
        closed
    }

    /// Idempotent `try_close` that logs failures instead of returning them.
    pub fn close(&self) {
        if let Err(err) = self.try_close() {
            tracing::warn!(error = %err, "client close failed");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn poll_legacy(inner: &ClientInner, handle: LegacyHandle, timeout: Duration) {
    let Binding::Legacy { stop, .. } = &inner.binding else {
        return;
    };
    while !stop.load(Ordering::Acquire) {
        match inner.native.legacy_receive(handle, timeout) {
            Ok(Some(raw)) => match parse::from_str::<Value>(&raw, "td_json_client_receive") {
                Ok(Value::Object(payload)) => inner.inbox.deliver(payload),
                Ok(_) => tracing::warn!("legacy poll: dropping non-object event"),
                Err(err) => tracing::warn!(error = %err, "legacy poll: dropping malformed event"),
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "legacy poll: native receive failed");
                thread::sleep(POLL_ERROR_BACKOFF.min(timeout));
            }
        }
    }
    inner.native.legacy_destroy(handle);
    tracing::debug!("legacy client destroyed");
}

pub(crate) fn decode_response(response: Option<String>) -> Result<Option<Value>, Error> {
    response
        .map(|raw| parse::from_str::<Value>(&raw, "td_execute").map(rename::from_engine))
        .transpose()
}

/// Engine `error` objects (already shaped with `_`) as `ErrorKind::Native`.
pub(crate) fn engine_error(value: &Value) -> Option<Error> {
    if value.get(rename::CALLER_TYPE_KEY).and_then(Value::as_str) != Some("error") {
        return None;
    }
    let mut err = Error::new(ErrorKind::Native).with_message(
        value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("engine error"),
    );
    if let Some(code) = value.get("code").and_then(Value::as_i64) {
        err = err.with_code(code);
    }
    Some(err)
}
