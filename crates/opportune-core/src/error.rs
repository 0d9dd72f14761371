//! Core error types.

use thiserror::Error;

use crate::group::GroupAddress;

/// Errors raised by the core model.
///
/// Everything here signals a setup-time or programming error; normal
/// runtime conditions such as buffer overflow or transfer interruption are
/// reported through return values and listener notifications instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A group address was used for a second group.
    #[error("group address {0} already assigned to another group")]
    DuplicateGroup(GroupAddress),

    /// A transfer was started on a connection that is down or busy.
    #[error("connection is not ready for a transfer: {0}")]
    ConnectionBusy(String),

    /// A message with the same id is already buffered.
    #[error("message {0} already in buffer")]
    DuplicateMessage(String),
}
