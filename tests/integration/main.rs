//! Tether integration test harness.
//!
//! Each test starts its own relay in-process on ephemeral loopback
//! ports, drives it over a real WebSocket and uses real TCP listeners
//! and UDP sockets as the remote peers. Nothing needs root.
//!
//!   cargo test --test integration

use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use tether_api::{ApiState, RelayState};
use tether_core::config::RelaySettings;
use tether_relay::{ChannelRegistry, ChannelSnapshot};

mod cascade;
mod protocol;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// An in-process relay. Dropping it broadcasts shutdown.
pub struct Relay {
    pub ws_url: String,
    pub api_url: String,
    pub registry: ChannelRegistry,
    pub shutdown: broadcast::Sender<()>,
}

impl Relay {
    pub async fn start() -> Result<Self> {
        Self::start_with(RelaySettings::default()).await
    }

    pub async fn start_with(settings: RelaySettings) -> Result<Self> {
        let registry = ChannelRegistry::new();
        let (shutdown, _) = broadcast::channel::<()>(1);

        let relay_listener = TcpListener::bind("127.0.0.1:0").await?;
        let api_listener = TcpListener::bind("127.0.0.1:0").await?;
        let ws_url = format!("ws://{}/", relay_listener.local_addr()?);
        let api_url = format!("http://{}/api", api_listener.local_addr()?);

        tokio::spawn(tether_api::serve_relay(
            relay_listener,
            RelayState {
                registry: registry.clone(),
                settings,
                shutdown_tx: shutdown.clone(),
            },
            "/".to_string(),
        ));
        tokio::spawn(tether_api::serve_api(
            api_listener,
            ApiState {
                registry: registry.clone(),
                started_at: std::time::Instant::now(),
                shutdown_tx: shutdown.clone(),
            },
        ));

        Ok(Self {
            ws_url,
            api_url,
            registry,
            shutdown,
        })
    }

    /// Open a control channel and wait until the relay has registered it.
    pub async fn connect(&self) -> Result<Client> {
        let before = self.registry.len();
        let (ws, _) = connect_async(self.ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect to {}", self.ws_url))?;
        wait_until("channel registration", || self.registry.len() > before).await?;
        Ok(Client { ws })
    }

    /// The only live channel.
    pub fn channel(&self) -> Result<ChannelSnapshot> {
        let mut channels = self.registry.snapshot();
        if channels.len() != 1 {
            bail!("expected one channel, found {}", channels.len());
        }
        Ok(channels.remove(0))
    }

    /// Wait until `id` has exactly `len` payloads queued.
    pub async fn wait_for_queue(&self, transport: &str, id: &str, len: usize) -> Result<()> {
        wait_until("queue length", || {
            self.registry.snapshot().iter().any(|c| {
                let sessions = if transport == "tcp" { &c.tcp } else { &c.udp };
                sessions.iter().any(|s| s.id == id && s.queue_length == len)
            })
        })
        .await
    }

    pub async fn api_get(&self, path: &str) -> Result<Value> {
        reqwest::get(format!("{}{}", self.api_url, path))
            .await?
            .json()
            .await
            .context("failed to parse API response")
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// Client end of one control channel.
pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    pub async fn send(&mut self, frame: Value) -> Result<()> {
        self.send_raw(&frame.to_string()).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn send_binary(&mut self, bytes: &[u8]) -> Result<()> {
        self.ws.send(Message::Binary(bytes.to_vec())).await?;
        Ok(())
    }

    /// Next reply frame, parsed.
    pub async fn reply(&mut self) -> Result<Value> {
        loop {
            let msg = timeout(REPLY_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for reply")?
                .context("control channel closed")??;
            match msg {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => bail!("control channel closed by relay"),
                _ => continue,
            }
        }
    }

    /// Fail if a reply arrives within a short window.
    pub async fn expect_silence(&mut self) -> Result<()> {
        match timeout(Duration::from_millis(250), self.ws.next()).await {
            Err(_) => Ok(()),
            Ok(msg) => bail!("unexpected frame: {:?}", msg),
        }
    }

    /// Send `receive` until a non-empty payload comes back.
    pub async fn receive_data(&mut self, frame: Value) -> Result<Value> {
        for _ in 0..100 {
            self.send(frame.clone()).await?;
            let reply = self.reply().await?;
            if reply["data"] != "" {
                return Ok(reply);
            }
            sleep(Duration::from_millis(20)).await;
        }
        bail!("no data arrived")
    }

    /// Whether the relay has closed this channel.
    pub async fn closed_by_relay(&mut self) -> bool {
        loop {
            match timeout(REPLY_TIMEOUT, self.ws.next()).await {
                Err(_) => return false,
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

pub fn tcp_frame(data: Value) -> Value {
    json!({"type": "tcp", "data": data})
}

pub fn udp_frame(data: Value) -> Value {
    json!({"type": "udp", "data": data})
}

pub fn invalid_id(transport: &str, id: &str) -> Value {
    json!({"type": transport, "status": "error", "message": "Invalid action or ID", "id": id})
}

/// A UDP port that was free a moment ago.
pub fn free_udp_port() -> Result<u16> {
    let probe = std::net::UdpSocket::bind("0.0.0.0:0")?;
    Ok(probe.local_addr()?.port())
}

pub async fn wait_until(what: &str, cond: impl Fn() -> bool) -> Result<()> {
    for _ in 0..250 {
        if cond() {
            return Ok(());
        }
        sleep(Duration::from_millis(20)).await;
    }
    bail!("timed out waiting for {what}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// The relay accepts a control channel and reports it to the status API.
#[tokio::test]
async fn test_channel_registers_and_deregisters() -> Result<()> {
    let relay = Relay::start().await?;
    let client = relay.connect().await?;

    let snap = relay.channel()?;
    assert!(snap.peer.starts_with("127.0.0.1:"), "peer: {}", snap.peer);
    assert!(snap.tcp.is_empty() && snap.udp.is_empty());

    client.close().await?;
    wait_until("channel removal", || relay.registry.is_empty()).await?;
    Ok(())
}
