//! Purpose: Define the native capability surface the routing core talks to.
//! Exports: `NativeSurface`, `LegacyHandle`, callback types, `TdjsonLibrary`.
//! Role: Seam between the routing core and tdjson; tests substitute a synthetic surface.
//! Invariants: Returned strings are owned copies; no native pointer escapes a call.
//! Invariants: Multiplexed `receive` is only ever called from the receive loop thread.
use std::ffi::c_void;
use std::ptr::NonNull;
use std::time::Duration;

use serde_json::json;

use crate::core::ClientId;
use crate::core::config::InterfaceMode;
use crate::core::error::Error;

mod callbacks;
mod library;
pub mod sys;

pub use callbacks::{forward_engine_logs_to_tracing, tracing_log_callback};
pub use library::TdjsonLibrary;

pub type LogMessageCallback = Box<dyn Fn(i32, &str) + Send + Sync>;
pub type FatalErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Opaque pointer to a legacy `td_json_client` instance.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LegacyHandle(NonNull<c_void>);

// The engine's legacy client is safe to use from any thread; only the pointer moves.
unsafe impl Send for LegacyHandle {}
unsafe impl Sync for LegacyHandle {}

impl LegacyHandle {
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

pub trait NativeSurface: Send + Sync {
    fn create_client_id(&self) -> Result<ClientId, Error>;
    fn send(&self, client_id: ClientId, request: &str) -> Result<(), Error>;
    /// Blocks up to `timeout`; `Ok(None)` means nothing arrived.
    fn receive(&self, timeout: Duration) -> Result<Option<String>, Error>;
    fn execute(&self, request: &str) -> Result<Option<String>, Error>;
    fn destroy(&self, client_id: ClientId) -> Result<(), Error>;

    fn legacy_create(&self) -> Result<LegacyHandle, Error>;
    fn legacy_send(&self, handle: LegacyHandle, request: &str) -> Result<(), Error>;
    fn legacy_receive(
        &self,
        handle: LegacyHandle,
        timeout: Duration,
    ) -> Result<Option<String>, Error>;
    fn legacy_execute(
        &self,
        handle: Option<LegacyHandle>,
        request: &str,
    ) -> Result<Option<String>, Error>;
    fn legacy_destroy(&self, handle: LegacyHandle);

    fn set_log_message_callback(
        &self,
        max_verbosity_level: i32,
        callback: Option<LogMessageCallback>,
    ) -> Result<(), Error>;
    fn set_log_fatal_error_callback(&self, callback: Option<FatalErrorCallback>)
    -> Result<(), Error>;

    fn set_log_verbosity(&self, interface: InterfaceMode, level: i32) -> Result<(), Error> {
        let request = json!({
            "@type": "setLogVerbosityLevel",
            "new_verbosity_level": level,
        })
        .to_string();
        match interface {
            InterfaceMode::Legacy => self.legacy_execute(None, &request)?,
            InterfaceMode::Multiplexed => self.execute(&request)?,
        };
        Ok(())
    }
}
