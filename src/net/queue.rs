//! Outbound message queue for sends attempted before the socket opens.
//!
//! DESIGN
//! ======
//! A plain FIFO. `flush` takes the whole backlog out before sending so an
//! entry can never go out twice and anything enqueued while the flush runs
//! waits for the next one. A failed send puts the failing entry and the rest
//! of the batch back at the head, still in order.

use std::collections::VecDeque;

/// A user message waiting for an open connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedMessage {
    pub content: String,
    pub folder: String,
    pub document: String,
}

#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
}

impl MessageQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. No de-duplication, no bound.
    pub fn enqueue(&mut self, content: impl Into<String>, folder: impl Into<String>, document: impl Into<String>) {
        self.entries.push_back(QueuedMessage {
            content: content.into(),
            folder: folder.into(),
            document: document.into(),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Peek at the pending entries in send order.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.entries.iter()
    }

    /// Send every pending entry in FIFO order.
    ///
    /// Returns how many entries went out.
    ///
    /// # Errors
    ///
    /// Returns the first error from `send`; the entry that failed and all
    /// later ones stay queued ahead of anything enqueued meanwhile.
    pub fn flush<E>(&mut self, mut send: impl FnMut(&QueuedMessage) -> Result<(), E>) -> Result<usize, E> {
        let mut batch = std::mem::take(&mut self.entries);
        let mut sent = 0_usize;

        while let Some(entry) = batch.pop_front() {
            if let Err(e) = send(&entry) {
                batch.push_front(entry);
                batch.append(&mut self.entries);
                self.entries = batch;
                return Err(e);
            }
            sent += 1;
        }

        Ok(sent)
    }

    /// Drop everything still pending, returning the count.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
