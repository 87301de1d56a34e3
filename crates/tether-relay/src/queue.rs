//! Per-session inbound queue.
//!
//! Socket data is appended in arrival order and only leaves the queue
//! when the client asks for it with `receive`.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct InboundQueue {
    items: VecDeque<String>,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: String) {
        self.items.push_back(payload);
    }

    /// Pop the oldest payload together with the length seen before the pop.
    pub fn pop_with_len(&mut self) -> (Option<String>, usize) {
        let len = self.items.len();
        (self.items.pop_front(), len)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
