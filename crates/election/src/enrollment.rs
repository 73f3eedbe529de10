//! Election bids
//!
//! Wire format:
//! ```text
//! [node_id: NodeId encoding]
//! [weight_count: u16]
//! [weights: u64 * weight_count]
//! [flags: u8]     bit 0 new candidate
//! ```

use std::cmp::Ordering;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use tessera_identity::NodeId;

use crate::error::{Error, Result};

const FLAG_NEW: u8 = 1;

/// Whether metric vector `a` wins against `b`.
///
/// Vectors are compared element by element in their agreed order and the
/// first difference decides. Equal vectors win in neither direction.
#[must_use]
pub fn wins(a: &[u64], b: &[u64]) -> bool {
    a > b
}

/// A candidate's bid in one election round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enrollment {
    node: NodeId,
    weights: Vec<u64>,
    is_new: bool,
}

impl Enrollment {
    /// Create a bid.
    ///
    /// `is_new` marks a candidate that starts without any prior partition
    /// state.
    #[must_use]
    pub const fn new(node: NodeId, weights: Vec<u64>, is_new: bool) -> Self {
        Self {
            node,
            weights,
            is_new,
        }
    }

    /// Candidate
    #[must_use]
    pub const fn node(&self) -> &NodeId {
        &self.node
    }

    /// Metric vector
    #[must_use]
    pub fn weights(&self) -> &[u64] {
        &self.weights
    }

    /// Whether the candidate has no prior state
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    /// Metric-only comparison, see [`wins`].
    #[must_use]
    pub fn wins(&self, other: &Self) -> bool {
        wins(&self.weights, &other.weights)
    }

    /// Total order used to pick a round's winner: a candidate with prior
    /// state ranks above a new one, then metrics decide, then the greater
    /// node id.
    #[must_use]
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .is_new
            .cmp(&self.is_new)
            .then_with(|| self.weights.cmp(&other.weights))
            .then_with(|| self.node.cmp(&other.node))
    }

    /// Whether this bid beats `other`. Exactly one of two distinct
    /// candidates beats the other.
    #[must_use]
    pub fn beats(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Greater
    }

    /// Append the wire form to `buf`.
    ///
    /// # Panics
    ///
    /// Panics if there are more than `u16::MAX` weights.
    pub fn encode(&self, buf: &mut impl BufMut) {
        self.node.encode(buf);
        let count = u16::try_from(self.weights.len())
            .unwrap_or_else(|_| panic!("{} weights exceed u16", self.weights.len()));
        buf.put_u16(count);
        for weight in &self.weights {
            buf.put_u64(*weight);
        }
        buf.put_u8(if self.is_new { FLAG_NEW } else { 0 });
    }

    /// Read one bid from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or an invalid node id.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        let node = NodeId::decode(buf)?;
        if buf.remaining() < 2 {
            return Err(Error::Truncated("weight count"));
        }
        let count = usize::from(buf.get_u16());
        if buf.remaining() < count * 8 + 1 {
            return Err(Error::Truncated("weights"));
        }
        let weights = (0..count).map(|_| buf.get_u64()).collect();
        let is_new = buf.get_u8() & FLAG_NEW != 0;
        Ok(Self::new(node, weights, is_new))
    }
}
