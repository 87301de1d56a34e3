//! TCP sessions — one relayed stream per client-chosen id.
//!
//! State machine: absent → connecting → open → closing → absent.
//! The socket lives in its own task; the control channel talks to it
//! through a [`TcpHandle`] and hears back through [`EventKind`]s.
//! A `close` command and a peer close share one teardown path: the
//! entry is only removed when the socket reports `Closed` (or `Error`).

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use tether_core::config::RelaySettings;
use tether_core::{CommandError, Rejection, Reply, Status, TcpCommand, Transport};

use crate::event::{EventKind, EventSink, SessionContext};
use crate::table::{SessionState, SessionTable};

#[derive(Debug)]
enum StreamCommand {
    Write(String),
    End,
}

/// Control-channel side of a TCP session task.
#[derive(Debug)]
pub struct TcpHandle {
    commands: mpsc::UnboundedSender<StreamCommand>,
}

impl TcpHandle {
    pub fn spawn(address: String, port: u16, settings: &RelaySettings, sink: EventSink) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = StreamTask {
            address,
            port,
            read_buffer: settings.tcp_read_buffer.max(1),
            connect_timeout: settings.connect_timeout(),
            commands: rx,
            sink,
        };
        tokio::spawn(task.run());
        Self { commands: tx }
    }

    /// Queue bytes for the stream. Writes issued while connecting are
    /// flushed in order once the connection is up.
    pub fn write(&self, message: String) -> bool {
        self.commands.send(StreamCommand::Write(message)).is_ok()
    }

    /// Gracefully end the stream. The session stays in the table until
    /// the socket reports its own close.
    pub fn end(&self) {
        let _ = self.commands.send(StreamCommand::End);
    }
}

struct StreamTask {
    address: String,
    port: u16,
    read_buffer: usize,
    connect_timeout: Option<Duration>,
    commands: mpsc::UnboundedReceiver<StreamCommand>,
    sink: EventSink,
}

impl StreamTask {
    async fn run(mut self) {
        let Some((stream, pending)) = self.connect().await else {
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(id = self.sink.id(), error = %e, "failed to set TCP_NODELAY");
        }
        if !self.sink.emit(EventKind::Connected) {
            return;
        }

        let (mut reader, mut writer) = stream.into_split();
        for message in pending {
            if let Err(e) = writer.write_all(message.as_bytes()).await {
                self.fail(e);
                return;
            }
        }

        let mut buf = BytesMut::with_capacity(self.read_buffer);
        let mut writable = true;

        loop {
            buf.reserve(self.read_buffer);

            tokio::select! {
                read = reader.read_buf(&mut buf) => match read {
                    Ok(0) => {
                        tracing::debug!(id = self.sink.id(), "tcp peer closed");
                        self.sink.emit(EventKind::Closed);
                        return;
                    }
                    Ok(_) => {
                        let chunk = buf.split();
                        let payload = String::from_utf8_lossy(&chunk).into_owned();
                        if !self.sink.emit(EventKind::Data(payload)) {
                            return;
                        }
                    }
                    Err(e) => {
                        self.fail(e);
                        return;
                    }
                },

                command = self.commands.recv(), if writable => match command {
                    Some(StreamCommand::Write(message)) => {
                        if let Err(e) = writer.write_all(message.as_bytes()).await {
                            self.fail(e);
                            return;
                        }
                    }
                    Some(StreamCommand::End) | None => {
                        writable = false;
                        if let Err(e) = writer.shutdown().await {
                            tracing::debug!(id = self.sink.id(), error = %e, "tcp shutdown failed");
                        }
                    }
                },

                _ = self.sink.closed() => {
                    let _ = writer.shutdown().await;
                    return;
                }
            }
        }
    }

    /// Connect, buffering writes that arrive in the meantime.
    /// An `End` before the connection is up abandons the attempt.
    async fn connect(&mut self) -> Option<(TcpStream, Vec<String>)> {
        let target = (self.address.clone(), self.port);
        let limit = self.connect_timeout;
        let connect = async move {
            let attempt = TcpStream::connect(target);
            match limit {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
                },
                None => attempt.await,
            }
        };
        tokio::pin!(connect);

        let mut pending = Vec::new();
        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(stream) => Some((stream, pending)),
                        Err(e) => {
                            self.fail(e);
                            None
                        }
                    };
                }

                command = self.commands.recv() => match command {
                    Some(StreamCommand::Write(message)) => pending.push(message),
                    Some(StreamCommand::End) => {
                        tracing::debug!(id = self.sink.id(), "tcp connect abandoned");
                        self.sink.emit(EventKind::Closed);
                        return None;
                    }
                    None => return None,
                },

                _ = self.sink.closed() => return None,
            }
        }
    }

    fn fail(&self, error: io::Error) {
        tracing::warn!(id = self.sink.id(), error = %error, "tcp connection error");
        self.sink.emit(EventKind::Error(error.to_string()));
    }
}

fn reject(id: String, error: CommandError) -> Option<Reply> {
    Some(Rejection::new(Some(id), error).into_reply(Transport::Tcp))
}

/// Apply one client command to the channel's TCP table.
///
/// Returns the reply frame, if the command produces one.
pub fn handle_command(
    table: &mut SessionTable<TcpHandle>,
    ctx: &SessionContext,
    command: TcpCommand,
) -> Option<Reply> {
    match command {
        TcpCommand::Connect { id, address, port } => {
            tracing::info!(channel = ctx.channel, id = %id, %address, port, "tcp connect");
            let inserted = table.try_insert_with(&id, SessionState::Connecting, |generation| {
                let sink = ctx.sink(Transport::Tcp, &id, generation);
                TcpHandle::spawn(address, port, &ctx.settings, sink)
            });
            if inserted {
                None
            } else {
                reject(id, CommandError::AlreadyConnected)
            }
        }

        TcpCommand::Send { id, message } => match table.get(&id) {
            Some(entry) if matches!(entry.state, SessionState::Connecting | SessionState::Open) => {
                if !entry.handle.write(message) {
                    // Task already gone; its terminal event is on the way.
                    tracing::debug!(channel = ctx.channel, id = %id, "tcp write after task exit");
                }
                None
            }
            _ => reject(id, CommandError::InvalidActionOrId),
        },

        TcpCommand::Receive { id } => match table.receive(&id) {
            Some((data, queue_length)) => Some(Reply::data(Transport::Tcp, &id, data, queue_length)),
            None => reject(id, CommandError::InvalidActionOrId),
        },

        TcpCommand::Close { id } => match table.get_mut(&id) {
            Some(entry) => {
                entry.handle.end();
                entry.state = SessionState::Closing;
                tracing::info!(channel = ctx.channel, id = %id, "tcp close requested");
                Some(Reply::status(Transport::Tcp, Status::Closed, &id))
            }
            None => reject(id, CommandError::InvalidActionOrId),
        },
    }
}

/// Apply one socket event to the channel's TCP table.
pub fn handle_event(
    table: &mut SessionTable<TcpHandle>,
    ctx: &SessionContext,
    id: &str,
    generation: u64,
    kind: EventKind,
) -> Option<Reply> {
    match kind {
        EventKind::Connected => {
            let entry = table.live_mut(id, generation)?;
            // A close that raced the connect has already been answered.
            if entry.state != SessionState::Connecting {
                return None;
            }
            entry.state = SessionState::Open;
            tracing::info!(channel = ctx.channel, id, "tcp connection established");
            Some(Reply::status(Transport::Tcp, Status::Connected, id))
        }
        EventKind::Data(payload) => {
            table.push(id, generation, payload);
            None
        }
        EventKind::Closed => {
            table.remove_live(id, generation)?;
            tracing::info!(channel = ctx.channel, id, "tcp connection closed");
            Some(Reply::status(Transport::Tcp, Status::Disconnected, id))
        }
        EventKind::Error(message) => {
            table.remove_live(id, generation)?;
            Some(Reply::error(Transport::Tcp, Some(id.to_string()), message))
        }
        EventKind::Bound(_) => None,
    }
}
