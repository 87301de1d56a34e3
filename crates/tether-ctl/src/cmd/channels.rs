//! Control channel listing, inspection and forced close.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, delete_json, get_json};

#[derive(Deserialize)]
struct SessionInfo {
    id: String,
    state: String,
    queue_length: usize,
}

#[derive(Deserialize)]
struct ChannelInfo {
    id: u64,
    peer: String,
    uptime_secs: u64,
    tcp: Vec<SessionInfo>,
    udp: Vec<SessionInfo>,
}

fn print_channel(c: &ChannelInfo) {
    println!("  ┌─ channel {}", c.id);
    println!("  │  peer   : {}", c.peer);
    println!("  │  uptime : {}s", c.uptime_secs);
    for (transport, sessions) in [("tcp", &c.tcp), ("udp", &c.udp)] {
        for s in sessions {
            println!(
                "  │  {} {:<16} {:<10} queued {}",
                transport, s.id, s.state, s.queue_length
            );
        }
    }
    println!("  └─ sessions : {} tcp, {} udp", c.tcp.len(), c.udp.len());
}

pub async fn cmd_channels(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct ChannelsResponse {
        channels: Vec<ChannelInfo>,
    }

    let resp: ChannelsResponse = get_json(&format!("{}/channels", base_url(port))).await?;

    if resp.channels.is_empty() {
        println!("No control channels connected.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Control Channels ({})", resp.channels.len());
    println!("═══════════════════════════════════════");
    for c in &resp.channels {
        print_channel(c);
    }

    Ok(())
}

pub async fn cmd_channel_show(port: u16, channel_id: &str) -> Result<()> {
    let resp: ChannelInfo =
        get_json(&format!("{}/channels/{}", base_url(port), channel_id)).await?;
    print_channel(&resp);
    Ok(())
}

pub async fn cmd_channel_close(port: u16, channel_id: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct CloseResponse {
        channel: u64,
        closed: bool,
    }

    let resp: CloseResponse =
        delete_json(&format!("{}/channels/{}", base_url(port), channel_id)).await?;

    if resp.closed {
        println!("✓ Channel {} closed", resp.channel);
    } else {
        println!("Channel not found: {}", channel_id);
    }

    Ok(())
}
