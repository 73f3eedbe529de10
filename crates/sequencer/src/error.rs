//! Error types for the transaction sequencer.

use tessera_identity::NodeId;
use thiserror::Error;

use crate::types::ServerTransactionId;

/// Errors returned by the transaction sequencer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The originating node has been marked as departed
    #[error("Node {0} has departed; new transactions are not accepted")]
    NodeDeparted(NodeId),

    /// No global id has been assigned for this transaction
    #[error("Unknown transaction {0}")]
    UnknownTransaction(ServerTransactionId),

    /// The global id space is used up
    #[error("Global transaction id space exhausted")]
    SequenceExhausted,
}

/// Result type for sequencer operations.
pub type Result<T> = std::result::Result<T, Error>;
