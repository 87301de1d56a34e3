//! Daemon status and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

pub async fn cmd_status(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct StatusResponse {
        channels: usize,
        tcp_sessions: usize,
        udp_sessions: usize,
        queued_payloads: usize,
        uptime_secs: u64,
    }

    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Tether Relay Status");
    println!("═══════════════════════════════════════");
    println!("  Uptime           : {}s", resp.uptime_secs);
    println!("  Control channels : {}", resp.channels);
    println!("  TCP sessions     : {}", resp.tcp_sessions);
    println!("  UDP sessions     : {}", resp.udp_sessions);
    println!("  Queued payloads  : {}", resp.queued_payloads);

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct ShutdownResponse {
        message: String,
    }

    let resp: ShutdownResponse =
        post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("✓ tetherd {}", resp.message);

    Ok(())
}
