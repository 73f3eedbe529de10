//! Error types for identity encoding and allocation.

use thiserror::Error;

/// Errors that can occur while decoding or allocating identities.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Batch size of zero requested
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(u64),

    /// String field was not valid UTF-8
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// The 56-bit sequence space of a group is used up
    #[error("Object id space exhausted for group {group} (requested {requested})")]
    ObjectIdSpaceExhausted {
        /// Group whose space is exhausted
        group: u8,
        /// Size of the batch that could not be reserved
        requested: u64,
    },

    /// The reserved group value appeared where a real group was expected
    #[error("Reserved group value on the wire")]
    ReservedGroup,

    /// Input ended before the value was complete
    #[error("Truncated input while decoding {0}")]
    Truncated(&'static str),

    /// Unknown node type discriminator
    #[error("Unknown node type discriminator: {0}")]
    UnknownNodeType(u8),
}

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, Error>;
