//! Channel registry — read-only view of live control channels.
//!
//! Each channel publishes a snapshot of its session tables here after
//! every event it processes. The registry never owns sessions; it only
//! lets the status API see them and ask a channel to close.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;

use crate::table::SessionSummary;

#[derive(Debug)]
struct ChannelEntry {
    peer: String,
    opened_at: Instant,
    tcp: Vec<SessionSummary>,
    udp: Vec<SessionSummary>,
    close: Arc<Notify>,
}

/// Point-in-time copy of one channel's state.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub id: u64,
    pub peer: String,
    pub uptime_secs: u64,
    pub tcp: Vec<SessionSummary>,
    pub udp: Vec<SessionSummary>,
}

/// Shared across the API and every channel task.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<DashMap<u64, ChannelEntry>>,
    next_id: Arc<AtomicU64>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a new channel. The returned notifier fires
    /// when someone asks the channel to close.
    pub fn register(&self, peer: impl Into<String>) -> (u64, Arc<Notify>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let close = Arc::new(Notify::new());
        self.channels.insert(
            id,
            ChannelEntry {
                peer: peer.into(),
                opened_at: Instant::now(),
                tcp: Vec::new(),
                udp: Vec::new(),
                close: close.clone(),
            },
        );
        (id, close)
    }

    pub fn update(&self, id: u64, tcp: Vec<SessionSummary>, udp: Vec<SessionSummary>) {
        if let Some(mut entry) = self.channels.get_mut(&id) {
            entry.tcp = tcp;
            entry.udp = udp;
        }
    }

    pub fn deregister(&self, id: u64) {
        self.channels.remove(&id);
    }

    /// Ask a channel to close. Returns false if no such channel is live.
    pub fn close(&self, id: u64) -> bool {
        match self.channels.get(&id) {
            Some(entry) => {
                entry.close.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<ChannelSnapshot> {
        self.channels.get(&id).map(|e| snapshot(id, e.value()))
    }

    /// Sorted by channel id.
    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        let mut out: Vec<ChannelSnapshot> = self
            .channels
            .iter()
            .map(|e| snapshot(*e.key(), e.value()))
            .collect();
        out.sort_by_key(|c| c.id);
        out
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn snapshot(id: u64, entry: &ChannelEntry) -> ChannelSnapshot {
    ChannelSnapshot {
        id,
        peer: entry.peer.clone(),
        uptime_secs: entry.opened_at.elapsed().as_secs(),
        tcp: entry.tcp.clone(),
        udp: entry.udp.clone(),
    }
}
