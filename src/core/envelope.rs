//! Purpose: Turn one raw multiplexed event into a typed (client id, payload) envelope.
//! Exports: `Envelope`, `CLIENT_ID_KEY`.
//! Role: The only place that knows the routing tag; the receive loop routes on `client_id`.
//! Invariants: The payload never contains `@client_id`.
//! Invariants: A missing, zero, or out-of-range tag yields `client_id: None` (droppable).
use serde_json::{Map, Value};

use crate::core::ClientId;
use crate::core::error::{Error, ErrorKind};
use crate::json::parse;

pub const CLIENT_ID_KEY: &str = "@client_id";

#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub client_id: Option<ClientId>,
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let value: Value = parse::from_str(raw, "td_receive")?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut payload) = value else {
            return Err(Error::new(ErrorKind::Corrupt).with_message("event is not a json object"));
        };
        let client_id = payload
            .remove(CLIENT_ID_KEY)
            .and_then(|tag| tag.as_i64())
            .and_then(|raw| i32::try_from(raw).ok())
            .and_then(ClientId::new);
        Ok(Self { client_id, payload })
    }
}
