//! Purpose: Synthetic tdjson surface shared by integration tests.
//! Exports: `FakeNative`, `wait_until`, `test_config`.
//! Role: Stands in for the loaded library so routing and lifecycle run without tdjson.
//! Invariants: Queued events are returned in push order, one per receive call.
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ffi::c_void;
use std::ptr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tdlbind::api::{
    ClientId, Config, Error, ErrorKind, FatalErrorCallback, InterfaceMode, LogMessageCallback,
    NativeSurface,
};
use tdlbind::core::native::LegacyHandle;

pub type ReceiveHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct FakeState {
    next_id: i32,
    freed: BTreeSet<i32>,
    events: VecDeque<String>,
    receive_hook: Option<ReceiveHook>,
    sent: Vec<(i32, Value)>,
    destroyed: Vec<i32>,
    executed: Vec<Value>,
    legacy_next: usize,
    legacy_queues: HashMap<usize, VecDeque<String>>,
    legacy_sent: Vec<(usize, Value)>,
    legacy_destroyed: Vec<usize>,
    legacy_timeouts: Vec<Duration>,
    legacy_executed: Vec<(Option<usize>, Value)>,
    log_callback: Option<(i32, LogMessageCallback)>,
    fatal_callback: Option<FatalErrorCallback>,
}

#[derive(Default)]
pub struct FakeNative {
    state: Mutex<FakeState>,
    ready: Condvar,
    reuse_ids: bool,
    auto_reply: bool,
    fail_destroy: bool,
}

impl FakeNative {
    pub fn new() -> Self {
        Self::default()
    }

    /// `create_client_id` hands out the lowest destroyed id before minting new ones.
    pub fn reusing_ids(mut self) -> Self {
        self.reuse_ids = true;
        self
    }

    /// Requests carrying `@extra` are answered with `ok`, or an engine error for
    /// `testReturnError`.
    pub fn auto_reply(mut self) -> Self {
        self.auto_reply = true;
        self
    }

    /// `destroy` still frees the id but reports a native failure.
    pub fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }

    pub fn push_event(&self, event: Value) {
        self.push_raw(event.to_string());
    }

    pub fn push_raw(&self, raw: impl Into<String>) {
        self.state().events.push_back(raw.into());
        self.ready.notify_all();
    }

    /// Runs `hook` on the receive thread after the next event is dequeued and
    /// before it is returned.
    pub fn on_next_receive(&self, hook: ReceiveHook) {
        self.state().receive_hook = Some(hook);
    }

    pub fn push_legacy_event(&self, handle: usize, event: Value) {
        self.state()
            .legacy_queues
            .entry(handle)
            .or_default()
            .push_back(event.to_string());
        self.ready.notify_all();
    }

    pub fn sent(&self) -> Vec<(i32, Value)> {
        self.state().sent.clone()
    }

    pub fn destroyed(&self) -> Vec<i32> {
        self.state().destroyed.clone()
    }

    pub fn executed(&self) -> Vec<Value> {
        self.state().executed.clone()
    }

    pub fn legacy_handles(&self) -> Vec<usize> {
        (1..=self.state().legacy_next).collect()
    }

    pub fn legacy_sent(&self) -> Vec<(usize, Value)> {
        self.state().legacy_sent.clone()
    }

    pub fn legacy_destroyed(&self) -> Vec<usize> {
        self.state().legacy_destroyed.clone()
    }

    pub fn legacy_timeouts(&self) -> Vec<Duration> {
        self.state().legacy_timeouts.clone()
    }

    pub fn legacy_executed(&self) -> Vec<(Option<usize>, Value)> {
        self.state().legacy_executed.clone()
    }

    /// Emits an engine log line the way tdjson would, honoring the installed max level.
    pub fn emit_log(&self, level: i32, message: &str) {
        let state = self.state();
        if let Some((max, callback)) = &state.log_callback {
            if level <= *max {
                callback(level, message);
            }
        }
    }

    pub fn emit_fatal(&self, message: &str) {
        if let Some(callback) = &self.state().fatal_callback {
            callback(message);
        }
    }

    fn reply(&self, request: &Value) -> Option<Value> {
        if !self.auto_reply {
            return None;
        }
        let extra = request.get("@extra")?.clone();
        let reply = if request["@type"] == "testReturnError" {
            json!({ "@type": "error", "code": 400, "message": "Bad Request", "@extra": extra })
        } else {
            json!({ "@type": "ok", "@extra": extra })
        };
        Some(reply)
    }

    fn answer_execute(request: &Value) -> Option<String> {
        match request["@type"].as_str() {
            Some("getTextEntities") => Some(
                json!({ "@type": "textEntities", "entities": [{ "@type": "textEntity", "offset": 0 }] })
                    .to_string(),
            ),
            Some("setLogVerbosityLevel") => Some(json!({ "@type": "ok" }).to_string()),
            _ => None,
        }
    }
}

fn parse(request: &str) -> Value {
    serde_json::from_str(request).expect("request json")
}

fn handle_index(handle: LegacyHandle) -> usize {
    handle.as_ptr().addr()
}

impl NativeSurface for FakeNative {
    fn create_client_id(&self) -> Result<ClientId, Error> {
        let mut state = self.state();
        let raw = match state.freed.first().copied() {
            Some(raw) if self.reuse_ids => {
                state.freed.remove(&raw);
                raw
            }
            _ => {
                state.next_id += 1;
                state.next_id
            }
        };
        ClientId::new(raw)
            .ok_or_else(|| Error::new(ErrorKind::Native).with_message("fake id overflow"))
    }

    fn send(&self, client_id: ClientId, request: &str) -> Result<(), Error> {
        let request = parse(request);
        let reply = self.reply(&request);
        let mut state = self.state();
        state.sent.push((client_id.get(), request));
        if let Some(mut reply) = reply {
            reply["@client_id"] = json!(client_id.get());
            state.events.push_back(reply.to_string());
            self.ready.notify_all();
        }
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<String>, Error> {
        let state = self.state();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |state| state.events.is_empty())
            .expect("fake state lock");
        let Some(event) = state.events.pop_front() else {
            return Ok(None);
        };
        let hook = state.receive_hook.take();
        drop(state);
        if let Some(hook) = hook {
            hook();
        }
        Ok(Some(event))
    }

    fn execute(&self, request: &str) -> Result<Option<String>, Error> {
        let request = parse(request);
        let response = Self::answer_execute(&request);
        self.state().executed.push(request);
        Ok(response)
    }

    fn destroy(&self, client_id: ClientId) -> Result<(), Error> {
        let mut state = self.state();
        state.destroyed.push(client_id.get());
        state.freed.insert(client_id.get());
        if self.fail_destroy {
            return Err(Error::new(ErrorKind::Native).with_message("destroy failed"));
        }
        Ok(())
    }

    fn legacy_create(&self) -> Result<LegacyHandle, Error> {
        let mut state = self.state();
        state.legacy_next += 1;
        let index = state.legacy_next;
        state.legacy_queues.entry(index).or_default();
        LegacyHandle::from_raw(ptr::without_provenance_mut::<c_void>(index))
            .ok_or_else(|| Error::new(ErrorKind::Native).with_message("null fake handle"))
    }

    fn legacy_send(&self, handle: LegacyHandle, request: &str) -> Result<(), Error> {
        let index = handle_index(handle);
        let request = parse(request);
        let reply = self.reply(&request);
        let mut state = self.state();
        state.legacy_sent.push((index, request));
        if let Some(reply) = reply {
            state
                .legacy_queues
                .entry(index)
                .or_default()
                .push_back(reply.to_string());
            self.ready.notify_all();
        }
        Ok(())
    }

    fn legacy_receive(
        &self,
        handle: LegacyHandle,
        timeout: Duration,
    ) -> Result<Option<String>, Error> {
        let index = handle_index(handle);
        let mut state = self.state();
        state.legacy_timeouts.push(timeout);
        // Cap the wait so close() does not have to sit out long client timeouts.
        let wait = timeout.min(Duration::from_millis(50));
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, wait, |state| {
                state
                    .legacy_queues
                    .get(&index)
                    .is_none_or(VecDeque::is_empty)
            })
            .expect("fake state lock");
        Ok(state
            .legacy_queues
            .get_mut(&index)
            .and_then(VecDeque::pop_front))
    }

    fn legacy_execute(
        &self,
        handle: Option<LegacyHandle>,
        request: &str,
    ) -> Result<Option<String>, Error> {
        let request = parse(request);
        let response = Self::answer_execute(&request);
        self.state()
            .legacy_executed
            .push((handle.map(handle_index), request));
        Ok(response)
    }

    fn legacy_destroy(&self, handle: LegacyHandle) {
        self.state().legacy_destroyed.push(handle_index(handle));
    }

    fn set_log_message_callback(
        &self,
        max_verbosity_level: i32,
        callback: Option<LogMessageCallback>,
    ) -> Result<(), Error> {
        self.state().log_callback = callback.map(|callback| (max_verbosity_level, callback));
        Ok(())
    }

    fn set_log_fatal_error_callback(
        &self,
        callback: Option<FatalErrorCallback>,
    ) -> Result<(), Error> {
        self.state().fatal_callback = callback;
        Ok(())
    }
}

pub fn test_config(interface: InterfaceMode) -> Config {
    Config {
        receive_timeout: Duration::from_millis(20),
        interface,
        ..Config::new()
    }
}

/// Polls `check` until it holds or `limit` elapses.
pub fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}
