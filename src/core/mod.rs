// Core modules: native surface, resolution, routing, configuration, errors.
pub mod config;
pub mod envelope;
pub mod error;
pub mod native;
pub mod receive_loop;
pub mod registry;
pub mod resolve;

use std::fmt;
use std::num::NonZeroI32;

/// Client identifier assigned by the native layer; never zero.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ClientId(NonZeroI32);

impl ClientId {
    pub fn new(raw: i32) -> Option<Self> {
        NonZeroI32::new(raw).map(Self)
    }

    pub fn get(self) -> i32 {
        self.0.get()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
