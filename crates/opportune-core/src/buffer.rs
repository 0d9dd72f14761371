//! Bounded per-host message store.
//!
//! Message ids are unique within a buffer and arrival order is preserved:
//! drop policies rely on it as the stable tie-break between equally ranked
//! eviction victims.

use crate::error::CoreError;
use crate::message::Message;

/// A host's message buffer.
///
/// The occupancy invariant (total size of buffered messages ≤ capacity) is
/// enforced exclusively at insertion/eviction time by the router that owns
/// the buffer; the buffer itself only does the bookkeeping.
#[derive(Debug)]
pub struct MessageBuffer {
    capacity: u64,
    occupied: u64,
    /// Messages in arrival order.
    messages: Vec<Message>,
}

impl MessageBuffer {
    /// Create an empty buffer with the given capacity in bytes.
    pub fn new(capacity: u64) -> Self {
        Self { capacity, occupied: 0, messages: Vec::new() }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently occupied by buffered messages.
    pub fn occupied(&self) -> u64 {
        self.occupied
    }

    /// Bytes still free.
    pub fn free(&self) -> u64 {
        self.capacity - self.occupied
    }

    /// Whether a message of `size` bytes fits without eviction.
    pub fn fits(&self, size: u64) -> bool {
        size <= self.free()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id() == id)
    }

    /// Insert a message at the back of the arrival order.
    ///
    /// Fails on a duplicate id. The caller must have made room first; a
    /// capacity violation is a bug in the caller, not a runtime condition.
    pub fn insert(&mut self, message: Message) -> Result<(), CoreError> {
        if self.contains(message.id()) {
            return Err(CoreError::DuplicateMessage(message.id().to_string()));
        }
        debug_assert!(
            self.occupied + message.size() <= self.capacity,
            "buffer overflow must be resolved before insertion"
        );
        self.occupied += message.size();
        self.messages.push(message);
        Ok(())
    }

    /// Remove and return the message with the given id.
    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id() == id)?;
        let message = self.messages.remove(index);
        self.occupied -= message.size();
        Some(message)
    }

    /// Remove and return every message whose TTL has run out at `now`.
    pub fn take_expired(&mut self, now: f64) -> Vec<Message> {
        let mut expired = Vec::new();
        let mut index = 0;
        while index < self.messages.len() {
            if self.messages[index].is_expired(now) {
                let message = self.messages.remove(index);
                self.occupied -= message.size();
                expired.push(message);
            } else {
                index += 1;
            }
        }
        expired
    }

    /// Buffered messages in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Ids of buffered messages in arrival order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.id())
    }
}
