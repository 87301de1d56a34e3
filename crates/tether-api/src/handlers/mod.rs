//! HTTP API handlers — exposes relay state as JSON.

pub mod channels;
pub mod status;

use std::time::Instant;

use tether_relay::ChannelRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub registry: ChannelRegistry,
    pub started_at: Instant,
    /// Shutdown broadcast sender — signals graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}
