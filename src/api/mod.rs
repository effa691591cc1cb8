//! Purpose: Define the public Rust API for embedding tdjson.
//! Exports: `Tdl`, `Client`, configuration and error types.
//! Role: Stable surface for embedders and the CLI; hides registry and loop internals.
//! Invariants: Callers shape requests with `_` as the type key; `@type` never leaks out.

mod client;
mod context;

pub use crate::core::ClientId;
pub use crate::core::config::{Config, ConfigOptions, InterfaceMode, Verbosity};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::native::{
    FatalErrorCallback, LogMessageCallback, NativeSurface, forward_engine_logs_to_tracing,
    tracing_log_callback,
};
pub use crate::core::resolve::{Environment, Resolver, Target};
pub use client::{Client, ClientOptions};
pub use context::{ApiResult, Tdl};
