//! Purpose: Bridge tdjson's context-free C log callbacks to Rust closures.
//! Exports: `install_log_message`, `install_fatal_error`, trampolines, tracing forwarder.
//! Role: tdjson callbacks carry no user data, so the closures live in process-wide slots.
//! Invariants: Trampolines never unwind into C; a panicking closure is swallowed.
//! Invariants: Installing `None` clears the slot before the engine is told to stop calling.
use std::ffi::CStr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use libc::{c_char, c_int};

use super::{FatalErrorCallback, LogMessageCallback, NativeSurface};
use crate::core::error::Error;

static LOG_MESSAGE: RwLock<Option<LogMessageCallback>> = RwLock::new(None);
static FATAL_ERROR: RwLock<Option<FatalErrorCallback>> = RwLock::new(None);

pub(super) fn install_log_message(callback: Option<LogMessageCallback>) {
    let mut slot = LOG_MESSAGE.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = callback;
}

pub(super) fn install_fatal_error(callback: Option<FatalErrorCallback>) {
    let mut slot = FATAL_ERROR.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = callback;
}

pub(super) extern "C" fn log_message_trampoline(verbosity_level: c_int, message: *const c_char) {
    let text = unsafe { message_text(message) };
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let slot = LOG_MESSAGE.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(callback) = slot.as_ref() {
            callback(verbosity_level, &text);
        }
    }));
}

pub(super) extern "C" fn fatal_error_trampoline(message: *const c_char) {
    let text = unsafe { message_text(message) };
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let slot = FATAL_ERROR.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(callback) = slot.as_ref() {
            callback(&text);
        }
    }));
}

unsafe fn message_text(message: *const c_char) -> String {
    if message.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

/// Callback that re-emits engine log lines as `tracing` events.
pub fn tracing_log_callback() -> LogMessageCallback {
    Box::new(|verbosity_level, message| {
        let message = message.trim_end();
        match verbosity_level {
            i32::MIN..=1 => tracing::error!(target: "tdjson", level = verbosity_level, "{message}"),
            2 => tracing::warn!(target: "tdjson", "{message}"),
            3 => tracing::info!(target: "tdjson", "{message}"),
            4 => tracing::debug!(target: "tdjson", "{message}"),
            _ => tracing::trace!(target: "tdjson", level = verbosity_level, "{message}"),
        }
    })
}

pub fn forward_engine_logs_to_tracing(
    surface: &Arc<dyn NativeSurface>,
    max_verbosity_level: i32,
) -> Result<(), Error> {
    surface.set_log_message_callback(max_verbosity_level, Some(tracing_log_callback()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::Mutex;

    #[test]
    fn trampoline_reaches_installed_closure_and_survives_panics() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        install_log_message(Some(Box::new(move |level, message| {
            sink.lock().expect("lock").push((level, message.to_string()));
        })));

        let message = CString::new("Client is closed").expect("cstring");
        log_message_trampoline(3, message.as_ptr());
        log_message_trampoline(1, std::ptr::null());

        install_log_message(Some(Box::new(|_, _| panic!("boom"))));
        log_message_trampoline(0, message.as_ptr());
        install_log_message(None);
        log_message_trampoline(0, message.as_ptr());

        let seen = seen.lock().expect("lock");
        assert_eq!(
            *seen,
            vec![(3, "Client is closed".to_string()), (1, String::new())]
        );
    }
}
