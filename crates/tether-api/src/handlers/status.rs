//! /status and /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub channels: usize,
    pub tcp_sessions: usize,
    pub udp_sessions: usize,
    pub queued_payloads: usize,
    pub uptime_secs: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let channels = state.registry.snapshot();

    let tcp_sessions = channels.iter().map(|c| c.tcp.len()).sum();
    let udp_sessions = channels.iter().map(|c| c.udp.len()).sum();
    let queued_payloads = channels
        .iter()
        .flat_map(|c| c.tcp.iter().chain(c.udp.iter()))
        .map(|s| s.queue_length)
        .sum();

    Json(StatusResponse {
        channels: channels.len(),
        tcp_sessions,
        udp_sessions,
        queued_payloads,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "shutting down".to_string(),
    })
}
