//! Messages held back while the transport is down.

use std::collections::VecDeque;

use tandem_shared::protocol::ClientMessage;

/// FIFO of messages waiting for the next open transport
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<ClientMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ClientMessage) {
        self.queue.push_back(message);
    }

    /// Put messages that were handed to a transport but never written back
    /// at the front, ahead of anything queued since.
    pub fn requeue_front(&mut self, messages: Vec<ClientMessage>) {
        for message in messages.into_iter().rev() {
            self.queue.push_front(message);
        }
    }

    /// Take every queued message in original order
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
