use std::collections::VecDeque;

use bytes::Bytes;
use dashmap::DashMap;

/// Pending signaling messages, one bounded FIFO per peer id.
#[derive(Debug)]
pub struct MessageStore {
    queues: DashMap<String, VecDeque<Bytes>>,
    max_queue: usize,
}

impl MessageStore {
    pub fn new(max_queue: usize) -> Self {
        Self {
            queues: DashMap::new(),
            max_queue: max_queue.max(1),
        }
    }

    /// Queue `body` for `peer_id`. Returns `true` when the queue was full and
    /// its oldest message was discarded.
    pub fn push(&self, peer_id: &str, body: Bytes) -> bool {
        let mut queue = self.queues.entry(peer_id.to_string()).or_default();
        let overflowed = queue.len() >= self.max_queue;
        if overflowed {
            queue.pop_front();
        }
        queue.push_back(body);
        overflowed
    }

    pub fn pop(&self, peer_id: &str) -> Option<Bytes> {
        let body = self.queues.get_mut(peer_id)?.pop_front();
        self.queues.remove_if(peer_id, |_, queue| queue.is_empty());
        body
    }

    pub fn pending(&self, peer_id: &str) -> usize {
        self.queues.get(peer_id).map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn peers(&self) -> usize {
        self.queues.len()
    }
}
