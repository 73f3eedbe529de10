//! Error types for reconnect sessions.

use tessera_identity::NodeId;
use thiserror::Error;

/// Errors returned by reconnect sessions and the session manager.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// An acknowledgement named a message that was never sent
    #[error("Acknowledgement {ack} is beyond the highest sent sequence {highest}")]
    AckOutOfRange {
        /// Acknowledged sequence
        ack: u64,
        /// Highest sequence transmitted so far
        highest: u64,
    },

    /// A live session already exists for the client
    #[error("Client {0} already has a live session")]
    AlreadyConnected(NodeId),

    /// Reconnect attempted on a session that never disconnected
    #[error("Session for {0} is not disconnected")]
    NotDisconnected(NodeId),

    /// The outbound queue is at capacity
    #[error("Send queue full ({capacity} messages)")]
    SendQueueFull {
        /// Configured capacity
        capacity: usize,
    },

    /// The session timed out and was torn down
    #[error("Session for {0} expired; client must re-handshake")]
    SessionExpired(NodeId),

    /// No session is registered for the client
    #[error("No session for {0}")]
    UnknownSession(NodeId),
}

/// Result type for reconnect operations.
pub type Result<T> = std::result::Result<T, Error>;
