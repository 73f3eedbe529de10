//! Error types for DNA encoding, replay and merging.

use tessera_identity::ObjectId;
use thiserror::Error;

/// Errors that can occur while decoding, applying or merging DNA.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Array write outside the current array bounds
    #[error("Array index {index} out of bounds (length {len})")]
    ArrayIndexOutOfBounds {
        /// First index written
        index: usize,
        /// Array length at the time of the write
        len: usize,
    },

    /// Array length above what an object may declare
    #[error("Array length {length} exceeds {max}")]
    ArrayTooLarge {
        /// Declared length
        length: u32,
        /// Largest accepted length
        max: u32,
    },

    /// Stream does not start with the DNA magic
    #[error("Bad magic: {0:#06x}")]
    BadMagic(u16),

    /// Two entries share an id but carry different payloads
    #[error("Conflicting entries for id {0}")]
    ConflictingEntry(String),

    /// A delta was applied to an object that has never seen a full record
    #[error("Delta for {0} applied before any full record")]
    DeltaWithoutBase(ObjectId),

    /// Error decoding an embedded identity
    #[error("Identity error: {0}")]
    Identity(#[from] tessera_identity::Error),

    /// A char value was not a valid scalar value
    #[error("Invalid char value: {0:#x}")]
    InvalidChar(u32),

    /// A string was not valid UTF-8
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Structurally invalid record
    #[error("Malformed DNA: {0}")]
    Malformed(&'static str),

    /// DNA targets a different object than the state it is applied to
    #[error("DNA for {found} applied to {expected}")]
    ObjectMismatch {
        /// Object the state belongs to
        expected: ObjectId,
        /// Object the DNA targets
        found: ObjectId,
    },

    /// DNA version is not newer than the applied state
    #[error("Stale DNA version {incoming} (current {current})")]
    StaleVersion {
        /// Version already applied
        current: u64,
        /// Version of the rejected DNA
        incoming: u64,
    },

    /// A count or length does not fit its wire field
    #[error("{what} of {len} does not fit the wire format")]
    TooLarge {
        /// What was being encoded
        what: &'static str,
        /// Offending length
        len: usize,
    },

    /// Bytes left after a complete record
    #[error("{0} trailing bytes after DNA record")]
    TrailingBytes(usize),

    /// Input ended before the value was complete
    #[error("Truncated input while decoding {0}")]
    Truncated(&'static str),

    /// Unknown action tag
    #[error("Unknown action tag: {0}")]
    UnknownActionTag(u8),

    /// Unknown value type tag
    #[error("Unknown value tag: {0}")]
    UnknownValueTag(u8),

    /// Record written by an incompatible protocol version
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),
}

/// Result type for DNA operations.
pub type Result<T> = std::result::Result<T, Error>;
