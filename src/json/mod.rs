//! Purpose: Internal JSON boundary shared by the native bridge and the client façade.
//! Exports: `parse` (decode with domain error mapping) and `rename` (discriminator key shaping).
//! Role: Single seam so callsites avoid ad hoc decode and key-walking logic.
//! Invariants: Helpers are pure; no hidden global state.

pub(crate) mod parse;
pub(crate) mod rename;
