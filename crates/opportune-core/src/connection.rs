//! Contact state machine between two hosts.
//!
//! A connection exists while two hosts are within range. It carries at most
//! one message transfer at a time over a constant bit-rate link. Range
//! detection is an external collaborator signal: the scheduler creates the
//! connection when hosts meet and closes it when they part, which
//! unconditionally aborts any in-progress transfer: partial bytes are
//! discarded and a later retry restarts from byte 0.

use tracing::trace;

use crate::error::CoreError;
use crate::message::{HostId, Message};

/// A message in flight on a connection.
#[derive(Debug)]
pub struct Transfer {
    /// The replica travelling over the link.
    pub message: Message,
    /// Sending host.
    pub from: HostId,
    /// When the transfer started.
    pub started_at: f64,
    /// When the last byte arrives, given constant speed.
    done_at: f64,
}

/// A connection between two hosts with one transfer slot.
#[derive(Debug)]
pub struct Connection {
    /// The host that initiated the contact.
    from: HostId,
    to: HostId,
    up: bool,
    /// Link capacity in bytes per second.
    speed: u64,
    transfer: Option<Transfer>,
    /// Bytes moved over this connection so far, including aborted partials.
    bytes_transferred: u64,
}

impl Connection {
    /// Create a new connection in the up (idle) state.
    pub fn new(from: HostId, to: HostId, speed: u64) -> Self {
        debug_assert!(speed > 0, "link speed must be positive");
        Self { from, to, up: true, speed, transfer: None, bytes_transferred: 0 }
    }

    pub fn initiator(&self) -> HostId {
        self.from
    }

    pub fn endpoints(&self) -> (HostId, HostId) {
        (self.from, self.to)
    }

    pub fn involves(&self, host: HostId) -> bool {
        self.from == host || self.to == host
    }

    /// The host on the other end of the connection.
    pub fn other(&self, host: HostId) -> HostId {
        if host == self.from { self.to } else { self.from }
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn is_transferring(&self) -> bool {
        self.transfer.is_some()
    }

    /// Up and idle: a new transfer may be started.
    pub fn is_ready_for_transfer(&self) -> bool {
        self.up && self.transfer.is_none()
    }

    pub fn speed(&self) -> u64 {
        self.speed
    }

    /// Start transferring a replica of `message` from `from` to the peer.
    ///
    /// Only one message may be in flight per connection at a time.
    pub fn start_transfer(&mut self, now: f64, from: HostId, message: &Message) -> Result<(), CoreError> {
        if !self.is_ready_for_transfer() {
            return Err(CoreError::ConnectionBusy(format!(
                "{} -> {} cannot start transfer of {}",
                self.from, self.to, message.id()
            )));
        }
        let duration = message.size() as f64 / self.speed as f64;
        trace!(message = message.id(), from = from.0, duration, "transfer started");
        self.transfer = Some(Transfer {
            message: message.replicate(),
            from,
            started_at: now,
            done_at: now + duration,
        });
        Ok(())
    }

    /// The message currently in flight, if any.
    pub fn message_on_fly(&self) -> Option<&Message> {
        self.transfer.as_ref().map(|t| &t.message)
    }

    /// Bytes still to transfer before the in-flight message is complete.
    pub fn remaining_bytes(&self, now: f64) -> u64 {
        match &self.transfer {
            Some(transfer) => {
                let remaining = (transfer.done_at - now) * self.speed as f64;
                if remaining > 0.0 { remaining.ceil() as u64 } else { 0 }
            }
            None => 0,
        }
    }

    /// Whether the in-flight transfer has moved all its bytes by `now`.
    pub fn is_transfer_done(&self, now: f64) -> bool {
        self.transfer.as_ref().is_some_and(|t| now >= t.done_at)
    }

    /// Finish the in-flight transfer, returning it for receiver-side
    /// admission. The connection returns to the up (idle) state.
    pub fn complete_transfer(&mut self) -> Option<Transfer> {
        let transfer = self.transfer.take()?;
        self.bytes_transferred += transfer.message.size();
        Some(transfer)
    }

    /// Abort the in-flight transfer, discarding partial bytes.
    pub fn abort_transfer(&mut self, now: f64) -> Option<Transfer> {
        let transfer = self.transfer.take()?;
        let remaining = {
            let left = (transfer.done_at - now) * self.speed as f64;
            if left > 0.0 { left.ceil() as u64 } else { 0 }
        };
        trace!(message = transfer.message.id(), remaining, "transfer aborted");
        self.bytes_transferred += transfer.message.size().saturating_sub(remaining);
        Some(transfer)
    }

    /// Tear the connection down, aborting any in-progress transfer.
    pub fn close(&mut self, now: f64) -> Option<Transfer> {
        self.up = false;
        self.abort_transfer(now)
    }

    /// Total bytes this connection has moved so far.
    pub fn total_bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Recipients;

    fn make_message(id: &str, size: u64) -> Message {
        Message::new(id, HostId(0), Recipients::Unicast(HostId(1)), size, 0.0)
    }

    fn make_connection() -> Connection {
        // 10 bytes per second
        Connection::new(HostId(0), HostId(1), 10)
    }

    #[test]
    fn test_new_connection_is_idle() {
        let conn = make_connection();
        assert!(conn.is_up());
        assert!(conn.is_ready_for_transfer());
        assert!(!conn.is_transferring());
    }

    #[test]
    fn test_transfer_takes_size_over_speed_seconds() {
        let mut conn = make_connection();
        conn.start_transfer(0.0, HostId(0), &make_message("M1", 50)).unwrap();

        assert!(conn.is_transferring());
        assert!(!conn.is_ready_for_transfer());
        assert_eq!(conn.remaining_bytes(0.0), 50);
        assert_eq!(conn.remaining_bytes(2.0), 30);
        assert!(!conn.is_transfer_done(4.9));
        assert!(conn.is_transfer_done(5.0));

        let transfer = conn.complete_transfer().unwrap();
        assert_eq!(transfer.message.id(), "M1");
        assert_eq!(transfer.from, HostId(0));
        assert!(conn.is_ready_for_transfer());
        assert_eq!(conn.total_bytes_transferred(), 50);
    }

    #[test]
    fn test_single_transfer_slot() {
        let mut conn = make_connection();
        conn.start_transfer(0.0, HostId(0), &make_message("M1", 50)).unwrap();
        let result = conn.start_transfer(0.0, HostId(1), &make_message("M2", 50));
        assert!(matches!(result, Err(CoreError::ConnectionBusy(_))));
    }

    #[test]
    fn test_close_aborts_in_flight_transfer() {
        let mut conn = make_connection();
        conn.start_transfer(0.0, HostId(0), &make_message("M1", 50)).unwrap();

        let aborted = conn.close(2.0).unwrap();
        assert_eq!(aborted.message.id(), "M1");
        assert!(!conn.is_up());
        assert!(!conn.is_ready_for_transfer());
        // 2 seconds at 10 B/s moved 20 of 50 bytes before the abort
        assert_eq!(conn.total_bytes_transferred(), 20);
    }

    #[test]
    fn test_transfer_replicates_message() {
        let mut conn = make_connection();
        let mut original = make_message("M1", 50);
        original.record_forward();
        conn.start_transfer(0.0, HostId(0), &original).unwrap();

        // the replica starts a fresh forwarding life at the receiver
        assert_eq!(conn.message_on_fly().unwrap().forward_count(), 0);
    }
}
