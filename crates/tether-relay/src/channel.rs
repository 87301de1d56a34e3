//! Control channel — the relay dispatcher for one connected client.
//!
//! A channel owns one TCP and one UDP session table. Client frames and
//! socket events are both handled on the channel's single task, one at
//! a time, so a handler always leaves the tables consistent before the
//! next input is looked at. When the client goes away the loop stops
//! taking frames and every owned session is closed.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Notify};

use tether_core::config::RelaySettings;
use tether_core::{Inbound, Reply, TcpCommand, Transport, UdpCommand};

use crate::event::{EventRx, SessionContext, SessionEvent};
use crate::registry::ChannelRegistry;
use crate::table::SessionTable;
use crate::tcp::{self, TcpHandle};
use crate::udp::{self, UdpHandle};

/// Single writer for reply frames. Once the client side is gone,
/// further replies are dropped.
#[derive(Debug)]
struct Outbox {
    tx: mpsc::Sender<String>,
    writable: bool,
}

impl Outbox {
    async fn send(&mut self, channel: u64, reply: Reply) {
        if !self.writable {
            tracing::debug!(channel, "control channel not writable, reply dropped");
            return;
        }
        let text = match reply.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(channel, error = %e, "failed to encode reply");
                return;
            }
        };
        if self.tx.send(text).await.is_err() {
            tracing::debug!(channel, "control channel writer gone");
            self.writable = false;
        }
    }
}

pub struct ControlChannel {
    id: u64,
    ctx: SessionContext,
    tcp: SessionTable<TcpHandle>,
    udp: SessionTable<UdpHandle>,
    events: EventRx,
    outbox: Outbox,
    registry: ChannelRegistry,
    close: Arc<Notify>,
}

impl ControlChannel {
    /// Register a new channel. Replies are written to `outbox` as JSON text.
    pub fn new(
        registry: &ChannelRegistry,
        peer: impl Into<String>,
        settings: RelaySettings,
        outbox: mpsc::Sender<String>,
    ) -> Self {
        let (id, close) = registry.register(peer);
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            id,
            ctx: SessionContext::new(id, settings, events_tx),
            tcp: SessionTable::new(Transport::Tcp),
            udp: SessionTable::new(Transport::Udp),
            events,
            outbox: Outbox {
                tx: outbox,
                writable: true,
            },
            registry: registry.clone(),
            close,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Process frames and socket events until the client disconnects,
    /// the channel is closed through the registry, or the daemon shuts down.
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<String>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(channel = self.id, "control channel open");
        let close = self.close.clone();

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(text) => self.handle_frame(&text).await,
                    None => {
                        tracing::info!(channel = self.id, "control channel disconnected");
                        break;
                    }
                },

                Some(event) = self.events.recv() => self.handle_event(event).await,

                _ = close.notified() => {
                    tracing::info!(channel = self.id, "control channel closed via API");
                    break;
                }

                _ = shutdown.recv() => {
                    tracing::info!(channel = self.id, "control channel shutting down");
                    break;
                }
            }
            self.publish();
        }

        // Nothing is read from `frames` past this point.
        drop(frames);
        self.teardown().await;
    }

    async fn handle_frame(&mut self, text: &str) {
        let reply = match Inbound::parse(text) {
            Ok(Inbound::Command(Transport::Tcp, fields)) => match TcpCommand::parse(fields) {
                Ok(command) => tcp::handle_command(&mut self.tcp, &self.ctx, command),
                Err(rejection) => Some(rejection.into_reply(Transport::Tcp)),
            },
            Ok(Inbound::Command(Transport::Udp, fields)) => match UdpCommand::parse(fields) {
                Ok(command) => udp::handle_command(&mut self.udp, &self.ctx, command).await,
                Err(rejection) => Some(rejection.into_reply(Transport::Udp)),
            },
            Ok(Inbound::Unknown(kind)) => {
                tracing::warn!(channel = self.id, kind = %kind, "unknown proxy type, frame dropped");
                None
            }
            Err(e) => {
                tracing::warn!(channel = self.id, error = %e, "invalid message format");
                Some(Reply::invalid_format())
            }
        };

        if let Some(reply) = reply {
            self.outbox.send(self.id, reply).await;
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        let SessionEvent {
            transport,
            id,
            generation,
            kind,
        } = event;

        let reply = match transport {
            Transport::Tcp => tcp::handle_event(&mut self.tcp, &self.ctx, &id, generation, kind),
            Transport::Udp => {
                udp::handle_event(&mut self.udp, &self.ctx, &id, generation, kind).await
            }
        };

        if let Some(reply) = reply {
            self.outbox.send(self.id, reply).await;
        }
    }

    fn publish(&self) {
        self.registry
            .update(self.id, self.tcp.summaries(), self.udp.summaries());
    }

    /// End every stream, close every datagram socket, forget the channel.
    async fn teardown(mut self) {
        let tcp_sessions = self.tcp.len();
        let udp_sessions = self.udp.len();

        for (id, entry) in self.tcp.drain() {
            tracing::debug!(channel = self.id, id = %id, "ending tcp session");
            entry.handle.end();
        }
        let udp: Vec<_> = self.udp.drain().collect();
        for (id, entry) in udp {
            tracing::debug!(channel = self.id, id = %id, "closing udp session");
            entry.handle.close().await;
        }

        self.outbox.writable = false;
        self.registry.deregister(self.id);
        tracing::info!(
            channel = self.id,
            tcp_sessions,
            udp_sessions,
            "control channel closed, sessions torn down"
        );
    }
}
