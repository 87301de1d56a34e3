//! Outbound reply frames.
//!
//! Three shapes go back over a control channel:
//!
//!   {type, status, message?, id?}        session status / command error
//!   {type, data, id, queueLength}        answer to `receive`
//!   {type: "error", message}             unparseable envelope

use serde::Serialize;

use crate::command::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Connected,
    Disconnected,
    Closed,
    Bound,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusFrame {
    #[serde(rename = "type")]
    pub transport: Transport,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataFrame {
    #[serde(rename = "type")]
    pub transport: Transport,
    pub data: String,
    pub id: String,
    /// Queue length observed before the pop that produced `data`.
    #[serde(rename = "queueLength")]
    pub queue_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatErrorFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Status(StatusFrame),
    Data(DataFrame),
    InvalidFormat(FormatErrorFrame),
}

impl Reply {
    pub fn status(transport: Transport, status: Status, id: &str) -> Self {
        Reply::Status(StatusFrame {
            transport,
            status,
            message: None,
            id: Some(id.to_string()),
        })
    }

    pub fn error(transport: Transport, id: Option<String>, message: impl Into<String>) -> Self {
        Reply::Status(StatusFrame {
            transport,
            status: Status::Error,
            message: Some(message.into()),
            id,
        })
    }

    pub fn data(transport: Transport, id: &str, data: String, queue_length: usize) -> Self {
        Reply::Data(DataFrame {
            transport,
            data,
            id: id.to_string(),
            queue_length,
        })
    }

    pub fn invalid_format() -> Self {
        Reply::InvalidFormat(FormatErrorFrame {
            kind: "error",
            message: "Invalid message format",
        })
    }

    /// Encode as the JSON text frame written to the client.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
