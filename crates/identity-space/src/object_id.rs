//! Packed object identifiers.
//!
//! Layout of an `ObjectId` (64 bits):
//! ```text
//! [group: 8 bits][sequence: 56 bits]
//! ```
//! Group 255 is reserved; `ObjectId::NULL` is all ones.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest legal object sequence number (2^56 - 1).
pub const MAX_SEQUENCE: u64 = (1 << 56) - 1;

const GROUP_SHIFT: u32 = 56;

/// Identifies a partition ("stripe") of the object space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(u8);

impl GroupId {
    /// Sentinel meaning "no group".
    pub const NULL: Self = Self(u8::MAX);

    /// Largest legal group value.
    pub const MAX: u8 = u8::MAX - 1;

    /// Create a group id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is the reserved sentinel 255.
    #[must_use]
    pub const fn new(id: u8) -> Self {
        assert!(id <= Self::MAX, "group id 255 is reserved");
        Self(id)
    }

    /// Get the inner value
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Whether this is the "no group" sentinel
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u8::MAX
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "group-null")
        } else {
            write!(f, "group-{}", self.0)
        }
    }
}

/// Cluster-wide identifier for one shared object instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Sentinel meaning "no object".
    pub const NULL: Self = Self(u64::MAX);

    /// Pack a sequence number and a group tag.
    ///
    /// # Panics
    ///
    /// Panics if `sequence` exceeds [`MAX_SEQUENCE`] or `group` is the null group.
    #[must_use]
    pub const fn encode(sequence: u64, group: GroupId) -> Self {
        assert!(sequence <= MAX_SEQUENCE, "object sequence out of range");
        assert!(!group.is_null(), "object id requires a non-null group");
        Self(((group.0 as u64) << GROUP_SHIFT) | sequence)
    }

    /// Unpack into `(sequence, group)`.
    #[must_use]
    pub const fn decode(self) -> (u64, GroupId) {
        (self.sequence(), self.group())
    }

    /// Sequence part of the id
    #[must_use]
    pub const fn sequence(self) -> u64 {
        self.0 & MAX_SEQUENCE
    }

    /// Group part of the id
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn group(self) -> GroupId {
        GroupId((self.0 >> GROUP_SHIFT) as u8)
    }

    /// Reinterpret a raw wire value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw 64-bit value as carried on the wire
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Whether this is the "no object" sentinel
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// Network byte order encoding.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode from network byte order.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "ObjectId(null)")
        } else {
            write!(f, "ObjectId({}:{})", self.group().value(), self.sequence())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundaries_roundtrip() {
        let sequences = [0, 1, MAX_SEQUENCE - 1, MAX_SEQUENCE];
        let groups = [GroupId::new(0), GroupId::new(1), GroupId::new(GroupId::MAX)];

        for &sequence in &sequences {
            for &group in &groups {
                let id = ObjectId::encode(sequence, group);
                assert_eq!(id.decode(), (sequence, group));
                assert!(!id.is_null());
            }
        }
    }

    #[test]
    fn test_group_lands_in_high_byte() {
        let id = ObjectId::encode(7, GroupId::new(3));
        assert_eq!(id.to_raw(), (3u64 << 56) | 7);
        assert_eq!(ObjectId::from_be_bytes(id.to_be_bytes()), id);
    }

    #[test]
    fn test_null_is_distinct_from_every_legal_id() {
        let max = ObjectId::encode(MAX_SEQUENCE, GroupId::new(GroupId::MAX));
        assert_ne!(max, ObjectId::NULL);
        assert!(ObjectId::NULL.group().is_null());
    }

    #[test]
    #[should_panic(expected = "object sequence out of range")]
    fn test_sequence_overflow_panics() {
        let _ = ObjectId::encode(MAX_SEQUENCE + 1, GroupId::new(0));
    }

    #[test]
    #[should_panic(expected = "group id 255 is reserved")]
    fn test_reserved_group_panics() {
        let _ = GroupId::new(255);
    }

    #[test]
    #[should_panic(expected = "non-null group")]
    fn test_null_group_rejected_by_encode() {
        let _ = ObjectId::encode(1, GroupId::NULL);
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(sequence in 0..=MAX_SEQUENCE, group in 0..=GroupId::MAX) {
            let group = GroupId::new(group);
            prop_assert_eq!(ObjectId::encode(sequence, group).decode(), (sequence, group));
        }
    }
}
