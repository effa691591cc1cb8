//! Purpose: Bind the tdjson shared library at runtime and expose it as a `NativeSurface`.
//! Exports: `TdjsonLibrary`.
//! Role: Production native surface; the only code that calls through raw tdjson symbols.
//! Invariants: At most one `TdjsonLibrary` is alive per process (callbacks are process-wide).
//! Invariants: Legacy symbols are required; multiplexed and log symbols are optional.
//! Notes: Strings returned by tdjson are copied before the next call into the library.
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use libc::c_char;
use libloading::Library;

use super::callbacks;
use super::sys;
use super::{FatalErrorCallback, LegacyHandle, LogMessageCallback, NativeSurface};
use crate::core::ClientId;
use crate::core::error::{Error, ErrorKind};

static LOADED: AtomicBool = AtomicBool::new(false);

const CLOSE_REQUEST: &str = r#"{"@type":"close"}"#;

#[derive(Clone, Copy)]
struct LegacySymbols {
    create: sys::JsonClientCreateFn,
    send: sys::JsonClientSendFn,
    receive: sys::JsonClientReceiveFn,
    execute: sys::JsonClientExecuteFn,
    destroy: sys::JsonClientDestroyFn,
}

#[derive(Clone, Copy)]
struct MultiplexedSymbols {
    create_client_id: sys::CreateClientIdFn,
    send: sys::SendFn,
    receive: sys::ReceiveFn,
    execute: sys::ExecuteFn,
}

pub struct TdjsonLibrary {
    path: PathBuf,
    legacy: LegacySymbols,
    multiplexed: Option<MultiplexedSymbols>,
    set_log_message_callback: Option<sys::SetLogMessageCallbackFn>,
    set_log_fatal_error_callback: Option<sys::SetLogFatalErrorCallbackFn>,
    // Declared last so the symbols above are never used after unload.
    _library: Library,
}

impl TdjsonLibrary {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading tdjson");
        let library = unsafe { Library::new(path) }.map_err(|err| {
            Error::new(ErrorKind::Load)
                .with_message("failed to load tdjson")
                .with_path(path)
                .with_hint("Set --libdir/--tdjson, or install tdjson on the loader search path.")
                .with_source(err)
        })?;
        if LOADED.swap(true, Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Config)
                .with_message("tdjson is already loaded in this process")
                .with_path(path));
        }
        Self::bind(path, library).inspect_err(|_| LOADED.store(false, Ordering::SeqCst))
    }

    fn bind(path: &Path, library: Library) -> Result<Self, Error> {
        let legacy = LegacySymbols {
            create: required(&library, sys::TD_JSON_CLIENT_CREATE, path)?,
            send: required(&library, sys::TD_JSON_CLIENT_SEND, path)?,
            receive: required(&library, sys::TD_JSON_CLIENT_RECEIVE, path)?,
            execute: required(&library, sys::TD_JSON_CLIENT_EXECUTE, path)?,
            destroy: required(&library, sys::TD_JSON_CLIENT_DESTROY, path)?,
        };
        let multiplexed = match (
            optional(&library, sys::TD_CREATE_CLIENT_ID),
            optional(&library, sys::TD_SEND),
            optional(&library, sys::TD_RECEIVE),
            optional(&library, sys::TD_EXECUTE),
        ) {
            (Some(create_client_id), Some(send), Some(receive), Some(execute)) => {
                Some(MultiplexedSymbols {
                    create_client_id,
                    send,
                    receive,
                    execute,
                })
            }
            _ => None,
        };
        if multiplexed.is_none() {
            tracing::debug!("tdjson has no multiplexed interface (td_create_client_id)");
        }

        Ok(Self {
            path: path.to_path_buf(),
            legacy,
            multiplexed,
            set_log_message_callback: optional(&library, sys::TD_SET_LOG_MESSAGE_CALLBACK),
            set_log_fatal_error_callback: optional(&library, sys::TD_SET_LOG_FATAL_ERROR_CALLBACK),
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn supports_multiplexed(&self) -> bool {
        self.multiplexed.is_some()
    }

    fn multiplexed(&self) -> Result<MultiplexedSymbols, Error> {
        self.multiplexed.ok_or_else(|| {
            Error::new(ErrorKind::Native)
                .with_message("tdjson does not export the multiplexed interface")
                .with_path(&self.path)
                .with_hint("Use TDLib 1.7.0 or newer, or select the legacy interface.")
        })
    }
}

impl NativeSurface for TdjsonLibrary {
    fn create_client_id(&self) -> Result<ClientId, Error> {
        let symbols = self.multiplexed()?;
        let raw = unsafe { (symbols.create_client_id)() };
        ClientId::new(raw).ok_or_else(|| {
            Error::new(ErrorKind::Native).with_message("td_create_client_id returned 0")
        })
    }

    fn send(&self, client_id: ClientId, request: &str) -> Result<(), Error> {
        let symbols = self.multiplexed()?;
        let request = request_cstring(request)?;
        unsafe { (symbols.send)(client_id.get(), request.as_ptr()) };
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<String>, Error> {
        let symbols = self.multiplexed()?;
        let response = unsafe { (symbols.receive)(timeout.as_secs_f64()) };
        Ok(unsafe { copy_response(response) })
    }

    fn execute(&self, request: &str) -> Result<Option<String>, Error> {
        let symbols = self.multiplexed()?;
        let request = request_cstring(request)?;
        let response = unsafe { (symbols.execute)(request.as_ptr()) };
        Ok(unsafe { copy_response(response) })
    }

    fn destroy(&self, client_id: ClientId) -> Result<(), Error> {
        // The multiplexed interface has no destroy symbol; closing is a request.
        self.send(client_id, CLOSE_REQUEST)
    }

    fn legacy_create(&self) -> Result<LegacyHandle, Error> {
        let raw = unsafe { (self.legacy.create)() };
        LegacyHandle::from_raw(raw).ok_or_else(|| {
            Error::new(ErrorKind::Native).with_message("td_json_client_create returned null")
        })
    }

    fn legacy_send(&self, handle: LegacyHandle, request: &str) -> Result<(), Error> {
        let request = request_cstring(request)?;
        unsafe { (self.legacy.send)(handle.as_ptr(), request.as_ptr()) };
        Ok(())
    }

    fn legacy_receive(
        &self,
        handle: LegacyHandle,
        timeout: Duration,
    ) -> Result<Option<String>, Error> {
        let response = unsafe { (self.legacy.receive)(handle.as_ptr(), timeout.as_secs_f64()) };
        Ok(unsafe { copy_response(response) })
    }

    fn legacy_execute(
        &self,
        handle: Option<LegacyHandle>,
        request: &str,
    ) -> Result<Option<String>, Error> {
        let request = request_cstring(request)?;
        let client = handle.map_or(ptr::null_mut(), LegacyHandle::as_ptr);
        let response = unsafe { (self.legacy.execute)(client, request.as_ptr()) };
        Ok(unsafe { copy_response(response) })
    }

    fn legacy_destroy(&self, handle: LegacyHandle) {
        unsafe { (self.legacy.destroy)(handle.as_ptr()) };
    }

    fn set_log_message_callback(
        &self,
        max_verbosity_level: i32,
        callback: Option<LogMessageCallback>,
    ) -> Result<(), Error> {
        let set = self.set_log_message_callback.ok_or_else(|| {
            Error::new(ErrorKind::Native)
                .with_message("tdjson does not export td_set_log_message_callback")
                .with_path(&self.path)
        })?;
        match callback {
            Some(callback) => {
                callbacks::install_log_message(Some(callback));
                unsafe { set(max_verbosity_level, Some(callbacks::log_message_trampoline)) };
            }
            None => {
                unsafe { set(max_verbosity_level, None) };
                callbacks::install_log_message(None);
            }
        }
        Ok(())
    }

    fn set_log_fatal_error_callback(
        &self,
        callback: Option<FatalErrorCallback>,
    ) -> Result<(), Error> {
        let set = self.set_log_fatal_error_callback.ok_or_else(|| {
            Error::new(ErrorKind::Native)
                .with_message("tdjson does not export td_set_log_fatal_error_callback")
                .with_path(&self.path)
        })?;
        match callback {
            Some(callback) => {
                callbacks::install_fatal_error(Some(callback));
                unsafe { set(Some(callbacks::fatal_error_trampoline)) };
            }
            None => {
                unsafe { set(None) };
                callbacks::install_fatal_error(None);
            }
        }
        Ok(())
    }
}

impl Drop for TdjsonLibrary {
    fn drop(&mut self) {
        if let Some(set) = self.set_log_message_callback {
            unsafe { set(0, None) };
        }
        if let Some(set) = self.set_log_fatal_error_callback {
            unsafe { set(None) };
        }
        callbacks::install_log_message(None);
        callbacks::install_fatal_error(None);
        LOADED.store(false, Ordering::SeqCst);
        tracing::debug!(path = %self.path.display(), "unloading tdjson");
    }
}

fn required<T: Copy>(library: &Library, name: &[u8], path: &Path) -> Result<T, Error> {
    unsafe { library.get::<T>(name) }
        .map(|symbol| *symbol)
        .map_err(|err| {
            Error::new(ErrorKind::Load)
                .with_message(format!("missing symbol {}", symbol_name(name)))
                .with_path(path)
                .with_source(err)
        })
}

fn optional<T: Copy>(library: &Library, name: &[u8]) -> Option<T> {
    unsafe { library.get::<T>(name) }.ok().map(|symbol| *symbol)
}

fn symbol_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned()
}

fn request_cstring(request: &str) -> Result<CString, Error> {
    CString::new(request).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("request contains NUL")
            .with_source(err)
    })
}

unsafe fn copy_response(response: *const c_char) -> Option<String> {
    if response.is_null() {
        return None;
    }
    Some(
        unsafe { CStr::from_ptr(response) }
            .to_string_lossy()
            .into_owned(),
    )
}
