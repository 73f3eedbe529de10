//! Error types for elections.

use tessera_identity::{GroupId, NodeId};
use thiserror::Error;

/// Errors that can occur during an election.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A candidate enrolled twice in one round with different bids
    #[error("{node} enrolled twice in round {round}")]
    DuplicateEnrollment {
        /// Candidate
        node: NodeId,
        /// Round number
        round: u64,
    },

    /// Error decoding an embedded identity
    #[error("Identity error: {0}")]
    Identity(#[from] tessera_identity::Error),

    /// A state machine event that is not legal in the current state
    #[error("Cannot {event} while {state}")]
    InvalidTransition {
        /// Current state name
        state: &'static str,
        /// Rejected event
        event: &'static str,
    },

    /// No round produced an active coordinator
    #[error("Partition {group} has no active coordinator after {rounds} rounds")]
    NoActiveCoordinator {
        /// Partition
        group: GroupId,
        /// Rounds attempted
        rounds: u32,
    },

    /// Enrollment arrived after the round resolved
    #[error("Round {round} of {group} is already resolved")]
    RoundClosed {
        /// Partition
        group: GroupId,
        /// Round number
        round: u64,
    },

    /// Event for a round older than the current one
    #[error("Stale round {got} (current {current})")]
    StaleRound {
        /// Current round
        current: u64,
        /// Round named by the event
        got: u64,
    },

    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Input ended before the value was complete
    #[error("Truncated input while decoding {0}")]
    Truncated(&'static str),

    /// Resumption point published by a node that is not our active
    #[error("Unexpected resumption point from {0}")]
    UnexpectedResumption(NodeId),
}

/// Result type for election operations.
pub type Result<T> = std::result::Result<T, Error>;
