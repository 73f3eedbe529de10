//! One election round

use std::collections::BTreeMap;

use tessera_identity::{GroupId, NodeId};
use tracing::debug;

use crate::enrollment::Enrollment;
use crate::error::{Error, Result};

/// Bids collected for one round of one partition.
///
/// Once resolved the round is closed: the winner never changes and further
/// enrollments are rejected. A fresh decision needs [`ElectionRound::restart`].
#[derive(Debug, Clone)]
pub struct ElectionRound {
    group: GroupId,
    number: u64,
    enrollments: BTreeMap<NodeId, Enrollment>,
    winner: Option<Enrollment>,
}

impl ElectionRound {
    /// Open round `number` for `group`
    #[must_use]
    pub const fn new(group: GroupId, number: u64) -> Self {
        Self {
            group,
            number,
            enrollments: BTreeMap::new(),
            winner: None,
        }
    }

    /// Partition
    #[must_use]
    pub const fn group(&self) -> GroupId {
        self.group
    }

    /// Round number
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// Add a bid. Re-sending an identical bid is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RoundClosed`] after resolution and
    /// [`Error::DuplicateEnrollment`] when a candidate changes its bid.
    pub fn enroll(&mut self, enrollment: Enrollment) -> Result<()> {
        if self.winner.is_some() {
            return Err(Error::RoundClosed {
                group: self.group,
                round: self.number,
            });
        }
        match self.enrollments.get(enrollment.node()) {
            Some(existing) if *existing == enrollment => Ok(()),
            Some(_) => Err(Error::DuplicateEnrollment {
                node: enrollment.node().clone(),
                round: self.number,
            }),
            None => {
                debug!(
                    "Round {} of {}: {} enrolled with {:?}",
                    self.number,
                    self.group,
                    enrollment.node(),
                    enrollment.weights()
                );
                self.enrollments
                    .insert(enrollment.node().clone(), enrollment);
                Ok(())
            }
        }
    }

    /// Number of bids received
    #[must_use]
    pub fn enrollment_count(&self) -> usize {
        self.enrollments.len()
    }

    /// Close the round and pick the bid that beats every other one.
    ///
    /// Returns `None` if nobody enrolled. Resolving again returns the same
    /// winner.
    pub fn resolve(&mut self) -> Option<&Enrollment> {
        if self.winner.is_none() {
            self.winner = self
                .enrollments
                .values()
                .max_by(|a, b| a.rank(b))
                .cloned();
        }
        self.winner.as_ref()
    }

    /// Whether the round has a winner
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.winner.is_some()
    }

    /// Winner, once resolved
    #[must_use]
    pub const fn winner(&self) -> Option<&Enrollment> {
        self.winner.as_ref()
    }

    /// A known bid that `declared` fails to beat, or a different bid from
    /// the same candidate. A declaration backed by `declared` is not a
    /// legitimate win of this round while one exists.
    #[must_use]
    pub fn challenger(&self, declared: &Enrollment) -> Option<&Enrollment> {
        self.enrollments.values().find(|known| {
            if known.node() == declared.node() {
                *known != declared
            } else {
                !declared.beats(known)
            }
        })
    }

    /// Discard this round and open the next one for the same partition
    #[must_use]
    pub fn restart(self) -> Self {
        Self::new(self.group, self.number + 1)
    }
}
