//! Typed relay commands.
//!
//! The `data` object of a command frame is loosely shaped on the wire.
//! It is validated once here into a closed set of per-transport commands;
//! everything downstream of the dispatcher works with the typed form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reply::Reply;

/// Socket kind a command or session belongs to. Doubles as the `type`
/// field of every non-error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The untyped `data` object of a command envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandFields {
    pub id: Option<String>,
    pub action: Option<String>,
    pub port: Option<u16>,
    pub address: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpCommand {
    Connect { id: String, address: String, port: u16 },
    Send { id: String, message: String },
    Receive { id: String },
    Close { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdpCommand {
    /// Port 0 binds an ephemeral port.
    Bind { id: String, port: u16 },
    Send { id: String, address: String, port: u16, message: String },
    Receive { id: String },
    Close { id: String },
}

/// Why a command was turned away. The display text is the `message`
/// field of the error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid parameters")]
    InvalidParameters,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Already bound")]
    AlreadyBound,
    #[error("Invalid action or ID")]
    InvalidActionOrId,
}

/// A rejected command: the error plus whatever id the client supplied,
/// so the reply can be correlated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub id: Option<String>,
    pub error: CommandError,
}

impl Rejection {
    pub fn new(id: Option<String>, error: CommandError) -> Self {
        Self { id, error }
    }

    pub fn for_id(id: &str, error: CommandError) -> Self {
        Self::new(Some(id.to_string()), error)
    }

    /// The error frame sent back for this rejection.
    pub fn into_reply(self, transport: Transport) -> Reply {
        Reply::error(transport, self.id, self.error.to_string())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Port 0 is never a usable destination.
fn destination(address: Option<String>, port: Option<u16>) -> Option<(String, u16)> {
    match (non_empty(address), port) {
        (Some(address), Some(port)) if port != 0 => Some((address, port)),
        _ => None,
    }
}

/// Split out the mandatory `id` and `action`.
fn id_and_action(fields: &mut CommandFields) -> Result<(String, String), Rejection> {
    let id = non_empty(fields.id.take());
    let action = non_empty(fields.action.take());
    match (id, action) {
        (Some(id), Some(action)) => Ok((id, action)),
        (id, _) => Err(Rejection::new(id, CommandError::InvalidParameters)),
    }
}

impl TcpCommand {
    pub fn parse(mut fields: CommandFields) -> Result<Self, Rejection> {
        let (id, action) = id_and_action(&mut fields)?;
        let invalid = |id: String| -> Result<Self, Rejection> {
            Err(Rejection::new(Some(id), CommandError::InvalidParameters))
        };

        match action.as_str() {
            "connect" => match destination(fields.address, fields.port) {
                Some((address, port)) => Ok(Self::Connect { id, address, port }),
                None => invalid(id),
            },
            "send" => match fields.message {
                Some(message) => Ok(Self::Send { id, message }),
                None => invalid(id),
            },
            "receive" => Ok(Self::Receive { id }),
            "close" => Ok(Self::Close { id }),
            _ => Err(Rejection::new(Some(id), CommandError::InvalidActionOrId)),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Connect { id, .. }
            | Self::Send { id, .. }
            | Self::Receive { id }
            | Self::Close { id } => id,
        }
    }
}

impl UdpCommand {
    /// Every action except `bind` carries a destination, and it is
    /// checked before the action itself is looked at.
    pub fn parse(mut fields: CommandFields) -> Result<Self, Rejection> {
        let (id, action) = id_and_action(&mut fields)?;

        if action == "bind" {
            return Ok(Self::Bind {
                id,
                port: fields.port.unwrap_or(0),
            });
        }

        let Some((address, port)) = destination(fields.address, fields.port) else {
            return Err(Rejection::new(Some(id), CommandError::InvalidParameters));
        };

        match action.as_str() {
            "send" => match fields.message {
                Some(message) => Ok(Self::Send { id, address, port, message }),
                None => Err(Rejection::new(Some(id), CommandError::InvalidParameters)),
            },
            "receive" => Ok(Self::Receive { id }),
            "close" => Ok(Self::Close { id }),
            _ => Err(Rejection::new(Some(id), CommandError::InvalidActionOrId)),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Bind { id, .. }
            | Self::Send { id, .. }
            | Self::Receive { id }
            | Self::Close { id } => id,
        }
    }
}
