//! UDP sessions — one bound datagram socket per client-chosen id.
//!
//! State machine: absent → binding → bound → absent. Unlike TCP, a
//! `close` command removes the session immediately. Each `send` names
//! its own destination; source addresses of inbound datagrams are not
//! passed on to the client.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tether_core::config::RelaySettings;
use tether_core::{CommandError, Rejection, Reply, Status, Transport, UdpCommand};

use crate::event::{EventKind, EventSink, SessionContext};
use crate::table::{SessionState, SessionTable};

#[derive(Debug)]
struct Datagram {
    address: String,
    port: u16,
    message: String,
}

/// Control-channel side of a UDP session task.
#[derive(Debug)]
pub struct UdpHandle {
    datagrams: mpsc::UnboundedSender<Datagram>,
    task: JoinHandle<()>,
}

impl UdpHandle {
    pub fn spawn(port: u16, settings: &RelaySettings, sink: EventSink) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = DatagramTask {
            port,
            recv_buffer: settings.udp_recv_buffer.max(1),
            datagrams: rx,
            sink,
        };
        Self {
            datagrams: tx,
            task: tokio::spawn(task.run()),
        }
    }

    /// Queue a datagram. Outcome is logged by the socket task only.
    pub fn send_to(&self, address: String, port: u16, message: String) -> bool {
        self.datagrams
            .send(Datagram {
                address,
                port,
                message,
            })
            .is_ok()
    }

    /// Close the socket. Returns once the task is gone and the port is
    /// free again. Nothing further is reported for this session.
    pub async fn close(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

struct DatagramTask {
    port: u16,
    recv_buffer: usize,
    datagrams: mpsc::UnboundedReceiver<Datagram>,
    sink: EventSink,
}

impl DatagramTask {
    async fn run(mut self) {
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        let local = match socket.local_addr() {
            Ok(local) => local,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        if !self.sink.emit(EventKind::Bound(local)) {
            return;
        }

        let mut buf = vec![0u8; self.recv_buffer];
        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        tracing::trace!(id = self.sink.id(), %from, len, "udp datagram received");
                        let payload = String::from_utf8_lossy(&buf[..len]).into_owned();
                        if !self.sink.emit(EventKind::Data(payload)) {
                            return;
                        }
                    }
                    Err(e) => {
                        self.fail(e);
                        return;
                    }
                },

                datagram = self.datagrams.recv() => match datagram {
                    Some(d) => {
                        let target = (d.address.as_str(), d.port);
                        match socket.send_to(d.message.as_bytes(), target).await {
                            Ok(n) => tracing::debug!(
                                id = self.sink.id(), address = %d.address, port = d.port, bytes = n,
                                "udp message sent"
                            ),
                            Err(e) => tracing::warn!(
                                id = self.sink.id(), address = %d.address, port = d.port, error = %e,
                                "error sending udp message"
                            ),
                        }
                    }
                    None => return,
                },

                _ = self.sink.closed() => return,
            }
        }
    }

    fn fail(&self, error: io::Error) {
        tracing::warn!(id = self.sink.id(), error = %error, "udp socket error");
        self.sink.emit(EventKind::Error(error.to_string()));
    }
}

fn reject(id: String, error: CommandError) -> Option<Reply> {
    Some(Rejection::new(Some(id), error).into_reply(Transport::Udp))
}

/// Apply one client command to the channel's UDP table.
pub async fn handle_command(
    table: &mut SessionTable<UdpHandle>,
    ctx: &SessionContext,
    command: UdpCommand,
) -> Option<Reply> {
    match command {
        UdpCommand::Bind { id, port } => {
            let inserted = table.try_insert_with(&id, SessionState::Binding, |generation| {
                UdpHandle::spawn(port, &ctx.settings, ctx.sink(Transport::Udp, &id, generation))
            });
            if inserted {
                tracing::info!(channel = ctx.channel, id = %id, port, "udp bind");
                None
            } else {
                reject(id, CommandError::AlreadyBound)
            }
        }

        UdpCommand::Send {
            id,
            address,
            port,
            message,
        } => match table.get(&id) {
            Some(entry) => {
                if !entry.handle.send_to(address, port, message) {
                    tracing::debug!(channel = ctx.channel, id = %id, "udp send after task exit");
                }
                None
            }
            None => reject(id, CommandError::InvalidActionOrId),
        },

        UdpCommand::Receive { id } => match table.receive(&id) {
            Some((data, queue_length)) => Some(Reply::data(Transport::Udp, &id, data, queue_length)),
            None => reject(id, CommandError::InvalidActionOrId),
        },

        UdpCommand::Close { id } => match table.remove(&id) {
            Some(entry) => {
                entry.handle.close().await;
                tracing::info!(channel = ctx.channel, id = %id, "udp socket closed");
                Some(Reply::status(Transport::Udp, Status::Closed, &id))
            }
            None => reject(id, CommandError::InvalidActionOrId),
        },
    }
}

/// Apply one socket event to the channel's UDP table.
pub async fn handle_event(
    table: &mut SessionTable<UdpHandle>,
    ctx: &SessionContext,
    id: &str,
    generation: u64,
    kind: EventKind,
) -> Option<Reply> {
    match kind {
        EventKind::Bound(local) => {
            let entry = table.live_mut(id, generation)?;
            entry.state = SessionState::Bound;
            tracing::info!(channel = ctx.channel, id, port = local.port(), "udp socket bound");
            Some(Reply::status(Transport::Udp, Status::Bound, id))
        }
        EventKind::Data(payload) => {
            table.push(id, generation, payload);
            None
        }
        EventKind::Error(message) => {
            let entry = table.remove_live(id, generation)?;
            entry.handle.close().await;
            Some(Reply::error(Transport::Udp, Some(id.to_string()), message))
        }
        EventKind::Connected | EventKind::Closed => None,
    }
}
