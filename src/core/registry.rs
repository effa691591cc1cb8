//! Purpose: Map live multiplexed client ids to their inbound handlers.
//! Exports: `DispatchRegistry`, `ClientHandle`.
//! Role: Shared state between client lifecycle calls and the receive loop thread.
//! Invariants: An id is present iff its client was created and not yet disposed.
//! Invariants: `loop_running` lives under the same lock as the map, so "observed empty, stop"
//! and "registered, start if stopped" cannot interleave.
//! Invariants: An id removed during a receive turn stays retired until that turn finishes;
//! re-registering it blocks, so an in-flight event never reaches the id's next owner.
//! Notes: Handles are cloned out and invoked after the lock is released.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::core::ClientId;

/// Consumer contract the receive loop dispatches into.
pub trait ClientHandle: Send + Sync {
    fn client_id(&self) -> ClientId;
    /// Called on the receive loop thread with the routing tag already removed.
    /// Must return quickly; every other client waits on it.
    fn handle_receive(&self, payload: Map<String, Value>);
    /// Deregister and release native resources; idempotent.
    fn dispose(&self);
}

#[derive(Default)]
struct RegistryState {
    clients: HashMap<ClientId, Arc<dyn ClientHandle>>,
    retired: HashSet<ClientId>,
    in_turn: bool,
    loop_running: bool,
}

#[derive(Default)]
pub struct DispatchRegistry {
    state: Mutex<RegistryState>,
    turn_finished: Condvar,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `handle` under its id. Returns `true` when the caller must start the
    /// receive loop (no loop was running); the flag is already set on return.
    pub fn register(&self, handle: Arc<dyn ClientHandle>) -> bool {
        let client_id = handle.client_id();
        let guard = self.state();
        let mut state = self
            .turn_finished
            .wait_while(guard, |state| state.retired.contains(&client_id))
            .unwrap_or_else(PoisonError::into_inner);
        let previous = state.clients.insert(client_id, handle);
        debug_assert!(previous.is_none(), "client {client_id} registered twice");
        if state.loop_running {
            false
        } else {
            state.loop_running = true;
            true
        }
    }

    pub fn unregister(&self, client_id: ClientId) -> Option<Arc<dyn ClientHandle>> {
        let mut state = self.state();
        let removed = state.clients.remove(&client_id);
        if removed.is_some() && state.in_turn {
            state.retired.insert(client_id);
        }
        removed
    }

    pub fn lookup(&self, client_id: ClientId) -> Option<Arc<dyn ClientHandle>> {
        self.state().clients.get(&client_id).cloned()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.state().clients.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn handles(&self) -> Vec<Arc<dyn ClientHandle>> {
        self.state().clients.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().clients.is_empty()
    }

    pub fn loop_running(&self) -> bool {
        self.state().loop_running
    }

    /// Start of a receive turn. Returns `false` (and clears the running flag) when no
    /// clients remain, which is the loop's only exit.
    pub(crate) fn begin_turn(&self) -> bool {
        let mut state = self.state();
        if state.clients.is_empty() {
            state.loop_running = false;
            return false;
        }
        state.in_turn = true;
        true
    }

    /// End of a receive turn: resolves the event's target and lifts retirements.
    pub(crate) fn finish_turn(&self, target: Option<ClientId>) -> Option<Arc<dyn ClientHandle>> {
        let mut state = self.state();
        let handle = target.and_then(|client_id| state.clients.get(&client_id).cloned());
        state.in_turn = false;
        state.retired.clear();
        self.turn_finished.notify_all();
        handle
    }

    /// Undo a `register` that asked for a loop which could not be started.
    pub(crate) fn abort_loop_start(&self) {
        self.state().loop_running = false;
    }
}
