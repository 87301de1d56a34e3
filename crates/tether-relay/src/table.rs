//! Session table — one per transport per control channel.
//!
//! An entry owns its socket handle and its inbound queue. The two are
//! inserted and removed together, so a queue can never outlive its
//! session or exist without one.

use std::collections::HashMap;

use serde::Serialize;
use tether_core::Transport;

use crate::queue::InboundQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// TCP connect in flight.
    Connecting,
    /// TCP stream established.
    Open,
    /// TCP end requested; waiting for the socket's own close.
    Closing,
    /// UDP bind in flight.
    Binding,
    /// UDP socket bound.
    Bound,
}

#[derive(Debug)]
pub struct SessionEntry<H> {
    pub handle: H,
    pub state: SessionState,
    /// Distinguishes this session from earlier ones that used the same id.
    pub generation: u64,
    queue: InboundQueue,
}

impl<H> SessionEntry<H> {
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

/// Status view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionState,
    pub queue_length: usize,
}

#[derive(Debug)]
pub struct SessionTable<H> {
    transport: Transport,
    entries: HashMap<String, SessionEntry<H>>,
    next_generation: u64,
}

impl<H> SessionTable<H> {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            entries: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert a new session unless `id` is taken.
    ///
    /// `make` receives the new session's generation and is only called
    /// when the id is free, so a rejected insert creates no socket.
    pub fn try_insert_with(
        &mut self,
        id: &str,
        state: SessionState,
        make: impl FnOnce(u64) -> H,
    ) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries.insert(
            id.to_string(),
            SessionEntry {
                handle: make(generation),
                state,
                generation,
                queue: InboundQueue::new(),
            },
        );
        true
    }

    pub fn get(&self, id: &str) -> Option<&SessionEntry<H>> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SessionEntry<H>> {
        self.entries.get_mut(id)
    }

    /// The entry for `id`, only if it is still the session that `generation` names.
    pub fn live_mut(&mut self, id: &str, generation: u64) -> Option<&mut SessionEntry<H>> {
        self.entries
            .get_mut(id)
            .filter(|entry| entry.generation == generation)
    }

    pub fn remove(&mut self, id: &str) -> Option<SessionEntry<H>> {
        self.entries.remove(id)
    }

    /// Remove `id` if it is still the session that `generation` names.
    pub fn remove_live(&mut self, id: &str, generation: u64) -> Option<SessionEntry<H>> {
        if self.live_mut(id, generation).is_some() {
            self.entries.remove(id)
        } else {
            None
        }
    }

    /// Append a payload to a live session's queue. Returns false for stale events.
    pub fn push(&mut self, id: &str, generation: u64, payload: String) -> bool {
        match self.live_mut(id, generation) {
            Some(entry) => {
                entry.queue.push(payload);
                true
            }
            None => false,
        }
    }

    /// Pull the oldest queued payload for `id`.
    ///
    /// Returns `None` when no session exists. Otherwise the payload (empty
    /// when the queue is drained) and the queue length before the pop.
    pub fn receive(&mut self, id: &str) -> Option<(String, usize)> {
        let entry = self.entries.get_mut(id)?;
        let (payload, len) = entry.queue.pop_with_len();
        Some((payload.unwrap_or_default(), len))
    }

    /// Remove every session, handing back each handle for closing.
    pub fn drain(&mut self) -> impl Iterator<Item = (String, SessionEntry<H>)> + '_ {
        self.entries.drain()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted by id.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .entries
            .iter()
            .map(|(id, entry)| SessionSummary {
                id: id.clone(),
                state: entry.state,
                queue_length: entry.queue.len(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
