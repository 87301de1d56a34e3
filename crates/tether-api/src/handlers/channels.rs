//! /channels handlers — control channel inspection and forced close.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use tether_relay::ChannelSnapshot;

use super::ApiState;

fn parse_channel_id(raw: &str) -> Result<u64, (StatusCode, String)> {
    raw.parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid channel id".to_string()))
}

// ── /channels ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ChannelsResponse {
    pub channels: Vec<ChannelSnapshot>,
}

pub async fn handle_channels(State(state): State<ApiState>) -> Json<ChannelsResponse> {
    Json(ChannelsResponse {
        channels: state.registry.snapshot(),
    })
}

// ── /channels/:id (GET) ───────────────────────────────────────────────────────

pub async fn handle_channel_inspect(
    State(state): State<ApiState>,
    Path(channel_id): Path<String>,
) -> Result<Json<ChannelSnapshot>, (StatusCode, String)> {
    let id = parse_channel_id(&channel_id)?;
    state
        .registry
        .get(id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "channel not found".to_string()))
}

// ── /channels/:id (DELETE) ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ChannelCloseResponse {
    pub channel: u64,
    pub closed: bool,
}

pub async fn handle_channel_close(
    State(state): State<ApiState>,
    Path(channel_id): Path<String>,
) -> Result<Json<ChannelCloseResponse>, (StatusCode, String)> {
    let id = parse_channel_id(&channel_id)?;
    let closed = state.registry.close(id);

    if closed {
        tracing::info!(channel = id, "channel close requested via API");
    }

    Ok(Json(ChannelCloseResponse {
        channel: id,
        closed,
    }))
}
