//! Per-partition election state machine

use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_identity::{GroupId, NodeId, ObjectId, ObjectIdSequence};
use tessera_sequencer::{GlobalTransactionId, TransactionSequencer};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// What a newly elected active publishes before passives may serve again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumptionPoint {
    /// Low watermark of the active's sequencer
    pub low_watermark: GlobalTransactionId,
    /// Next global transaction id the active will assign
    pub next_global_transaction_id: GlobalTransactionId,
    /// Next unreserved object id of the partition
    pub next_object_id: ObjectId,
}

impl ResumptionPoint {
    /// Snapshot the local sequencer and object id cursor
    #[must_use]
    pub fn capture(sequencer: &TransactionSequencer, ids: &ObjectIdSequence) -> Self {
        Self {
            low_watermark: sequencer.low_watermark(),
            next_global_transaction_id: sequencer.next_global_transaction_id(),
            next_object_id: ids.current(),
        }
    }

    /// Move local numbering forward to this point. Never moves backwards.
    pub fn apply(&self, sequencer: &TransactionSequencer, ids: &ObjectIdSequence) {
        sequencer.resume_from(self.next_global_transaction_id);
        ids.resume_from(self.next_object_id);
    }
}

/// Election state of the local node for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionState {
    /// A round is in progress
    Electing {
        /// Current round
        round: u64,
    },
    /// This node is the partition's active coordinator
    Active {
        /// Round that elected us
        round: u64,
    },
    /// Another node is active
    Passive {
        /// Round that elected `active`
        round: u64,
        /// The active coordinator
        active: NodeId,
        /// Whether the active's resumption point has been observed
        synced: bool,
    },
}

impl ElectionState {
    /// Round the state belongs to
    #[must_use]
    pub const fn round(&self) -> u64 {
        match self {
            Self::Electing { round } | Self::Active { round } | Self::Passive { round, .. } => {
                *round
            }
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Electing { .. } => "electing",
            Self::Active { .. } => "active",
            Self::Passive { .. } => "passive",
        }
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (round {})", self.name(), self.round())
    }
}

/// Owns the election state of the local node for one partition.
///
/// `Electing → Active | Passive`; `Active` and `Passive` return to
/// `Electing` when the active coordinator fails.
#[derive(Debug)]
pub struct ElectionCoordinator {
    local: NodeId,
    group: GroupId,
    state: ElectionState,
    resumption: Option<ResumptionPoint>,
}

impl ElectionCoordinator {
    /// Start electing, before any round
    #[must_use]
    pub const fn new(local: NodeId, group: GroupId) -> Self {
        Self {
            local,
            group,
            state: ElectionState::Electing { round: 0 },
            resumption: None,
        }
    }

    /// Local node
    #[must_use]
    pub const fn local(&self) -> &NodeId {
        &self.local
    }

    /// Partition
    #[must_use]
    pub const fn group(&self) -> GroupId {
        self.group
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &ElectionState {
        &self.state
    }

    /// Current round
    #[must_use]
    pub const fn round(&self) -> u64 {
        self.state.round()
    }

    /// Whether this node is active
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, ElectionState::Active { .. })
    }

    /// The current active, if one is known
    #[must_use]
    pub const fn active(&self) -> Option<&NodeId> {
        match &self.state {
            ElectionState::Active { .. } => Some(&self.local),
            ElectionState::Passive { active, .. } => Some(active),
            ElectionState::Electing { .. } => None,
        }
    }

    /// Whether this node may serve reads and queued work: always when
    /// active, and as a passive only after observing the resumption point.
    #[must_use]
    pub const fn can_serve(&self) -> bool {
        matches!(
            self.state,
            ElectionState::Active { .. } | ElectionState::Passive { synced: true, .. }
        )
    }

    /// Last resumption point published or observed in this term
    #[must_use]
    pub const fn resumption_point(&self) -> Option<&ResumptionPoint> {
        self.resumption.as_ref()
    }

    /// Open the next round
    pub fn start_round(&mut self) -> u64 {
        let round = self.round() + 1;
        self.enter(round);
        round
    }

    /// Join a round opened by a peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleRound`] unless `round` is newer than the current one.
    pub fn enter_round(&mut self, round: u64) -> Result<()> {
        if round <= self.round() {
            return Err(Error::StaleRound {
                current: self.round(),
                got: round,
            });
        }
        self.enter(round);
        Ok(())
    }

    fn enter(&mut self, round: u64) {
        debug!("{} entering election round {} for {}", self.local, round, self.group);
        self.state = ElectionState::Electing { round };
        self.resumption = None;
    }

    /// Record that this node won `round` and published `point`.
    ///
    /// # Errors
    ///
    /// Fails unless the node is electing in exactly `round`.
    pub fn won(&mut self, round: u64, point: ResumptionPoint) -> Result<()> {
        match self.state {
            ElectionState::Electing { round: current } if current == round => {
                info!("{} is active for {} (round {})", self.local, self.group, round);
                self.state = ElectionState::Active { round };
                self.resumption = Some(point);
                Ok(())
            }
            ElectionState::Electing { round: current } => Err(Error::StaleRound {
                current,
                got: round,
            }),
            _ => Err(Error::InvalidTransition {
                state: self.state.name(),
                event: "win",
            }),
        }
    }

    /// Record that `active` won `round`. The node becomes an unsynced passive.
    /// Hearing the same winner again is a no-op.
    ///
    /// # Errors
    ///
    /// Fails for a round older than the current one, when this node is
    /// itself active in that round, or when another active was already
    /// accepted for that round.
    pub fn lost(&mut self, round: u64, active: NodeId) -> Result<()> {
        let current = self.round();
        if round < current {
            return Err(Error::StaleRound { current, got: round });
        }
        if let ElectionState::Passive {
            round: settled,
            active: followed,
            ..
        } = &self.state
        {
            if *settled == round {
                if *followed == active {
                    return Ok(());
                }
                warn!(
                    "{} rejecting {} as active for round {}: already following {}",
                    self.local, active, round, followed
                );
                return Err(Error::InvalidTransition {
                    state: "passive",
                    event: "accept a conflicting active",
                });
            }
        }
        if self.is_active() {
            if round == current {
                return Err(Error::InvalidTransition {
                    state: "active",
                    event: "accept another active",
                });
            }
            warn!(
                "{} stepping down for {}: {} declared active in round {}",
                self.local, self.group, active, round
            );
        }
        info!("{} is passive for {}; active is {} (round {})", self.local, self.group, active, round);
        self.state = ElectionState::Passive {
            round,
            active,
            synced: false,
        };
        self.resumption = None;
        Ok(())
    }

    /// Accept the resumption point published by our active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedResumption`] if `from` is not the active
    /// this passive follows.
    pub fn observe_resumption(&mut self, from: &NodeId, point: ResumptionPoint) -> Result<()> {
        match &mut self.state {
            ElectionState::Passive { active, synced, .. } if active == from => {
                *synced = true;
                self.resumption = Some(point);
                info!(
                    "{} synced to {} at watermark {}",
                    self.local, from, point.low_watermark
                );
                Ok(())
            }
            _ => Err(Error::UnexpectedResumption(from.clone())),
        }
    }

    /// React to the failure of `failed`. If it is the current active a new
    /// round starts immediately and its number is returned.
    pub fn on_active_failure(&mut self, failed: &NodeId) -> Option<u64> {
        if self.active() != Some(failed) {
            debug!("{} ignoring failure of {}: not the active", self.local, failed);
            return None;
        }
        warn!("Active {} of {} failed, starting new election", failed, self.group);
        Some(self.start_round())
    }
}
