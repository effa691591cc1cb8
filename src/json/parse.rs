//! Purpose: Decode JSON text produced by the engine into serde values.
//! Exports: `from_str`.
//! Invariants: Failures map to `ErrorKind::Corrupt`; the caller names the context.

use serde::de::DeserializeOwned;

use crate::core::error::{Error, ErrorKind};

pub(crate) fn from_str<T: DeserializeOwned>(input: &str, context: &str) -> Result<T, Error> {
    serde_json::from_str(input).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("invalid json from {context}"))
            .with_source(err)
    })
}
