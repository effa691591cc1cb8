//! Purpose: tdjson binding library used by the `tdlbind` CLI and embedders.
//! Exports: `api` (context, clients, errors), `core` (resolver, registry, receive loop, native).
//! Role: Loads tdjson at runtime and multiplexes its event stream across clients.
//! Invariants: `api` is the supported surface; `core` is public for tests and tooling.
//! Invariants: Every native call goes through `core::native::NativeSurface`.
pub mod api;
pub mod core;
mod json;
