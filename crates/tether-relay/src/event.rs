//! Socket events flowing from session tasks into their control channel.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use tether_core::config::RelaySettings;
use tether_core::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Connected,
    Bound(SocketAddr),
    Data(String),
    Closed,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub transport: Transport,
    pub id: String,
    pub generation: u64,
    pub kind: EventKind,
}

pub type EventTx = mpsc::UnboundedSender<SessionEvent>;
pub type EventRx = mpsc::UnboundedReceiver<SessionEvent>;

/// Handed to a session task so it can report back without knowing
/// anything about the channel that owns it.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: EventTx,
    transport: Transport,
    id: String,
    generation: u64,
}

impl EventSink {
    /// Returns false once the owning channel is gone.
    pub fn emit(&self, kind: EventKind) -> bool {
        self.tx
            .send(SessionEvent {
                transport: self.transport,
                id: self.id.clone(),
                generation: self.generation,
                kind,
            })
            .is_ok()
    }

    /// Resolves when the owning channel stops listening.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Per-channel context every session handler is given.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub channel: u64,
    pub settings: RelaySettings,
    events: EventTx,
}

impl SessionContext {
    pub fn new(channel: u64, settings: RelaySettings, events: EventTx) -> Self {
        Self {
            channel,
            settings,
            events,
        }
    }

    pub fn sink(&self, transport: Transport, id: &str, generation: u64) -> EventSink {
        EventSink {
            tx: self.events.clone(),
            transport,
            id: id.to_string(),
            generation,
        }
    }
}
