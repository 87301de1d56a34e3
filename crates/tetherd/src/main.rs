//! tetherd — TCP/UDP relay daemon driven over WebSocket control channels.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use tether_api::{ApiState, RelayState};
use tether_core::config::TetherConfig;
use tether_relay::ChannelRegistry;

/// How long shutdown waits for channels to tear down their sessions.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = TetherConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = TetherConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TetherConfig::default()
    });
    tracing::info!(
        bind_addr = %config.network.bind_addr,
        ws_port = config.network.ws_port,
        api_port = config.network.api_port,
        "tetherd starting"
    );

    let registry = ChannelRegistry::new();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Listeners ────────────────────────────────────────────────────────────
    let relay_addr = format!("{}:{}", config.network.bind_addr, config.network.ws_port);
    let relay_listener = TcpListener::bind(&relay_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {relay_addr}"))?;

    let api_listener = TcpListener::bind(("127.0.0.1", config.network.api_port))
        .await
        .with_context(|| format!("failed to bind API on 127.0.0.1:{}", config.network.api_port))?;

    // ── Spawn tasks ──────────────────────────────────────────────────────────
    let mut relay_task = tokio::spawn(tether_api::serve_relay(
        relay_listener,
        RelayState {
            registry: registry.clone(),
            settings: config.relay.clone(),
            shutdown_tx: shutdown_tx.clone(),
        },
        config.network.ws_path.clone(),
    ));

    let mut api_task = tokio::spawn(tether_api::serve_api(
        api_listener,
        ApiState {
            registry: registry.clone(),
            started_at: Instant::now(),
            shutdown_tx: shutdown_tx.clone(),
        },
    ));

    let stats_printer = {
        let registry = registry.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let channels = registry.snapshot();
                        let tcp: usize = channels.iter().map(|c| c.tcp.len()).sum();
                        let udp: usize = channels.iter().map(|c| c.udp.len()).sum();
                        tracing::info!(channels = channels.len(), tcp, udp, "relay stats");
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = &mut relay_task    => tracing::error!("relay listener exited: {:?}", r),
        r = &mut api_task      => tracing::error!("API listener exited: {:?}", r),
    }

    // A listener may have exited on its own; make sure everything else stops.
    let _ = shutdown_tx.send(());

    let drain = async {
        while !registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(channels = registry.len(), "channels still open at exit");
    }
    stats_printer.abort();

    Ok(())
}
