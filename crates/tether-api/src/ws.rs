//! WebSocket bridge — moves frames between an upgraded socket and its
//! control channel.
//!
//! The reader forwards text (and lossily decoded binary) frames to the
//! channel in order. The writer drains the channel's outbox. Either side
//! ending closes the channel, which tears down every session it owns.

use std::fmt;
use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};

use tether_core::config::RelaySettings;
use tether_relay::{ChannelRegistry, ControlChannel};

/// Client frames buffered ahead of the dispatcher.
const INBOUND_FRAMES: usize = 64;

#[derive(Clone)]
pub struct RelayState {
    pub registry: ChannelRegistry,
    pub settings: RelaySettings,
    /// Daemon shutdown. Every channel subscribes.
    pub shutdown_tx: broadcast::Sender<()>,
}

pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<RelayState>,
) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, peer, state))
}

async fn run_socket(socket: WebSocket, peer: SocketAddr, state: RelayState) {
    let (sink, stream) = socket.split();
    bridge(sink, stream, peer, state).await;
}

/// Run one control channel over a split WebSocket until either side ends.
async fn bridge<Si, St, E>(mut sink: Si, mut stream: St, peer: SocketAddr, state: RelayState)
where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: fmt::Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let (frames_tx, frames_rx) = mpsc::channel::<String>(INBOUND_FRAMES);
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<String>(state.settings.outbound_frames.max(1));

    let channel = ControlChannel::new(
        &state.registry,
        peer.to_string(),
        state.settings.clone(),
        outbox_tx,
    );
    let channel_id = channel.id();
    let dispatcher = tokio::spawn(channel.run(frames_rx, state.shutdown_tx.subscribe()));

    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbox_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(channel = channel_id, error = %e, "websocket write failed");
                return;
            }
        }
        let _ = sink.close().await;
    });
    let mut writer_done = false;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(channel = channel_id, error = %e, "websocket read failed");
                        break;
                    }
                };
                if frames_tx.send(text).await.is_err() {
                    break;
                }
            }

            // Closed from the daemon side.
            _ = frames_tx.closed() => break,

            // Client no longer takes replies.
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    drop(frames_tx);
    if let Err(e) = dispatcher.await {
        tracing::error!(channel = channel_id, error = %e, "control channel task failed");
    }
    if !writer_done {
        let _ = writer.await;
    }
    tracing::debug!(channel = channel_id, %peer, "websocket released");
}
