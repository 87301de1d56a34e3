//! Inbound command envelope.
//!
//! Every client frame is `{ "type": "tcp" | "udp", "data": { ... } }`.
//! A frame that is not JSON, or lacks either key, is malformed and earns
//! an `Invalid message format` reply. A well-formed frame with an
//! unrecognised `type` is not an error on the wire: it is dropped.

use serde::Deserialize;

use crate::command::{CommandFields, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Transport, CommandFields),
    /// Unrecognised top-level `type`. Logged by the caller, never answered.
    Unknown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("envelope is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("envelope missing `{0}`")]
    MissingField(&'static str),
    #[error("command data is malformed: {0}")]
    Data(#[source] serde_json::Error),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<serde_json::Value>,
    data: Option<serde_json::Value>,
}

impl Inbound {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(ParseError::Json)?;
        let kind = raw.kind.ok_or(ParseError::MissingField("type"))?;
        let data = raw.data.ok_or(ParseError::MissingField("data"))?;

        let transport = match kind {
            serde_json::Value::String(s) if s == "tcp" => Transport::Tcp,
            serde_json::Value::String(s) if s == "udp" => Transport::Udp,
            serde_json::Value::String(other) => return Ok(Inbound::Unknown(other)),
            other => return Ok(Inbound::Unknown(other.to_string())),
        };

        let fields = serde_json::from_value(data).map_err(ParseError::Data)?;
        Ok(Inbound::Command(transport, fields))
    }
}
