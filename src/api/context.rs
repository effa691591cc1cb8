//! Purpose: Own the process's binding state: configuration, loaded library, receive loop.
//! Exports: `Tdl`.
//! Role: Entry point for embedders and the CLI; creates clients and runs global requests.
//! Invariants: Configuration is frozen by the first successful `init`; later `configure` fails.
//! Invariants: `init` is idempotent and runs at most one native load.
//! Invariants: Multiplexed clients share one registry and one receive loop per context.
#![allow(clippy::result_large_err)]

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde_json::Value;

use super::client::{Client, ClientOptions, decode_response};
use crate::core::ClientId;
use crate::core::config::{Config, ConfigOptions, InterfaceMode, Verbosity};
use crate::core::error::{Error, ErrorKind};
use crate::core::native::{FatalErrorCallback, LogMessageCallback, NativeSurface, TdjsonLibrary};
use crate::core::receive_loop::ReceiveLoop;
use crate::core::registry::DispatchRegistry;
use crate::core::resolve::Resolver;
use crate::json::rename;

pub type ApiResult<T> = Result<T, Error>;

struct Runtime {
    config: Config,
    native: Arc<dyn NativeSurface>,
    receive_loop: ReceiveLoop,
}

impl Runtime {
    fn start(config: Config, native: Arc<dyn NativeSurface>) -> ApiResult<Self> {
        if let Verbosity::Level(level) = config.verbosity {
            native.set_log_verbosity(config.interface, level)?;
        }
        let receive_loop = ReceiveLoop::new(
            Arc::clone(&native),
            Arc::new(DispatchRegistry::new()),
            config.receive_timeout,
        );
        Ok(Self {
            config,
            native,
            receive_loop,
        })
    }
}

pub struct Tdl {
    config: Mutex<Config>,
    runtime: OnceLock<Runtime>,
}

impl Tdl {
    pub fn new() -> Self {
        Self::with_config(Config::new())
    }

    /// Unstarted context; the library is loaded by the first `init` or request.
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
            runtime: OnceLock::new(),
        }
    }

    /// Context already bound to `native`, skipping library resolution.
    pub fn from_surface(config: Config, native: Arc<dyn NativeSurface>) -> ApiResult<Self> {
        let runtime = OnceLock::new();
        let _ = runtime.set(Runtime::start(config.clone(), native)?);
        Ok(Self {
            config: Mutex::new(config),
            runtime,
        })
    }

    fn config_guard(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> Config {
        self.config_guard().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.get().is_some()
    }

    pub fn configure(&self, options: ConfigOptions) -> ApiResult<()> {
        let mut config = self.config_guard();
        if self.is_initialized() {
            return Err(Error::new(ErrorKind::Config)
                .with_message("tdjson is already loaded; configure must run before init"));
        }
        config.apply(options);
        Ok(())
    }

    pub fn init(&self) -> ApiResult<()> {
        self.runtime().map(|_| ())
    }

    fn runtime(&self) -> ApiResult<&Runtime> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }
        let config = self.config_guard();
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }

        let path = match &config.prebuild_dir {
            Some(dir) => Resolver::detect().resolve(dir)?,
            None => config.library_path(),
        };
        let library = TdjsonLibrary::load(&path)?;
        if config.interface == InterfaceMode::Multiplexed && !library.supports_multiplexed() {
            return Err(Error::new(ErrorKind::Config)
                .with_message("multiplexed interface requested but tdjson lacks it")
                .with_path(&path)
                .with_hint("Use TDLib 1.7.0 or newer, or select the legacy interface."));
        }
        tracing::info!(path = %path.display(), interface = ?config.interface, "tdjson loaded");

        let runtime = Runtime::start(config.clone(), Arc::new(library))?;
        let _ = self.runtime.set(runtime);
        drop(config);
        self.runtime.get().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("runtime missing after init")
        })
    }

    pub fn native(&self) -> ApiResult<Arc<dyn NativeSurface>> {
        Ok(Arc::clone(&self.runtime()?.native))
    }

    /// Synchronous global request; loads tdjson on first use.
    pub fn execute(&self, request: Value) -> ApiResult<Option<Value>> {
        let runtime = self.runtime()?;
        let request = rename::to_engine(request).to_string();
        let response = match runtime.config.interface {
            InterfaceMode::Legacy => runtime.native.legacy_execute(None, &request)?,
            InterfaceMode::Multiplexed => runtime.native.execute(&request)?,
        };
        decode_response(response)
    }

    /// `None` removes the callback. Levels above `max_verbosity_level` are not delivered.
    pub fn set_log_message_callback(
        &self,
        max_verbosity_level: i32,
        callback: Option<LogMessageCallback>,
    ) -> ApiResult<()> {
        self.runtime()?
            .native
            .set_log_message_callback(max_verbosity_level, callback)
    }

    pub fn set_log_fatal_error_callback(&self, callback: Option<FatalErrorCallback>) -> ApiResult<()> {
        self.runtime()?.native.set_log_fatal_error_callback(callback)
    }

    pub fn create_client(&self, options: ClientOptions) -> ApiResult<Client> {
        let runtime = self.runtime()?;
        match runtime.config.interface {
            InterfaceMode::Multiplexed => {
                Client::multiplexed(Arc::clone(&runtime.native), &runtime.receive_loop)
            }
            InterfaceMode::Legacy => {
                let timeout = options
                    .receive_timeout
                    .unwrap_or(runtime.config.receive_timeout);
                Client::legacy(Arc::clone(&runtime.native), timeout)
            }
        }
    }

    /// Live multiplexed clients, ascending.
    pub fn registered_client_ids(&self) -> Vec<ClientId> {
        self.runtime
            .get()
            .map(|runtime| runtime.receive_loop.registry().client_ids())
            .unwrap_or_default()
    }

    pub fn receive_loop_running(&self) -> bool {
        self.runtime
            .get()
            .is_some_and(|runtime| runtime.receive_loop.is_running())
    }

    /// Disposes every multiplexed client and waits for the receive loop to stop.
    /// Legacy clients are closed by their own `Client` values.
    ///
    /// Clients created while this runs are disposed too; `shutdown` returns once a
    /// wait for the loop ends with the registry empty.
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime.get() else {
            return;
        };
        loop {
            let handles = runtime.receive_loop.registry().handles();
            tracing::debug!(clients = handles.len(), "shutting down");
            for handle in handles {
                handle.dispose();
            }
            if runtime.receive_loop.join_idle() {
                break;
            }
        }
    }
}

impl Default for Tdl {
    fn default() -> Self {
        Self::new()
    }
}
