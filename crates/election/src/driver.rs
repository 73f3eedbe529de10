//! Async election rounds over a transport

use async_trait::async_trait;
use tessera_identity::{NodeId, ObjectIdSequence};
use tessera_sequencer::TransactionSequencer;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::ElectionConfig;
use crate::coordinator::{ElectionCoordinator, ElectionState, ResumptionPoint};
use crate::enrollment::Enrollment;
use crate::error::{Error, Result};
use crate::round::ElectionRound;
use crate::weights::Weights;

/// Messages exchanged between the members of one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionMessage {
    /// A peer's bid for `round`
    Enrollment {
        /// Round the bid belongs to
        round: u64,
        /// The bid
        enrollment: Enrollment,
    },
    /// A peer won `round` and publishes its resumption point
    Declaration {
        /// Round that was won
        round: u64,
        /// The winning bid; its node is the new active
        enrollment: Enrollment,
        /// Where passives resume from
        point: ResumptionPoint,
    },
}

/// Delivers election messages to and from the other members of a partition.
#[async_trait]
pub trait ElectionTransport: Send + Sync {
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Broadcast our bid for `round`
    async fn publish(&self, round: u64, enrollment: Enrollment) -> std::result::Result<(), Self::Error>;

    /// Broadcast that we won `round` with `enrollment`
    async fn declare_active(
        &self,
        round: u64,
        enrollment: Enrollment,
        point: ResumptionPoint,
    ) -> std::result::Result<(), Self::Error>;

    /// Wait for the next message from a peer
    async fn recv(&self) -> std::result::Result<ElectionMessage, Self::Error>;
}

/// How an election ended for the local node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// We are active and published `point`
    Won {
        /// Deciding round
        round: u64,
        /// Published resumption point
        point: ResumptionPoint,
    },
    /// `active` won; we are a synced passive
    Lost {
        /// Deciding round
        round: u64,
        /// The active coordinator
        active: NodeId,
        /// Resumption point observed from `active`
        point: ResumptionPoint,
    },
}

enum RoundResult {
    Decided(ElectionOutcome),
    Superseded { round: u64, enrollment: Enrollment },
    Undecided,
}

/// Runs election rounds for the local node until the partition has an
/// active coordinator.
#[derive(Debug)]
pub struct ElectionDriver<T> {
    transport: T,
    config: ElectionConfig,
    weights: Weights,
    is_new: bool,
}

impl<T> ElectionDriver<T>
where
    T: ElectionTransport,
{
    /// Create a driver bidding with `weights`.
    ///
    /// `is_new` marks a node that starts without prior partition state.
    pub const fn new(transport: T, config: ElectionConfig, weights: Weights, is_new: bool) -> Self {
        Self {
            transport,
            config,
            weights,
            is_new,
        }
    }

    /// Transport in use
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the local bid
    pub fn candidate(&self, node: NodeId) -> Enrollment {
        Enrollment::new(node, self.weights.generate(), self.is_new)
    }

    /// Run rounds until one decides, retrying undecided rounds with
    /// exponential backoff.
    ///
    /// A winner captures its resumption point from `sequencer` and `ids` and
    /// declares itself; a loser waits for that declaration and moves its own
    /// `sequencer` and `ids` forward to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveCoordinator`] once `max_rounds` rounds have
    /// failed to decide, or [`Error::Transport`] if the transport fails.
    pub async fn run_election(
        &self,
        coordinator: &mut ElectionCoordinator,
        sequencer: &TransactionSequencer,
        ids: &ObjectIdSequence,
    ) -> Result<ElectionOutcome> {
        let opened = matches!(coordinator.state(), ElectionState::Electing { round } if *round > 0);
        let mut round = if opened {
            coordinator.round()
        } else {
            coordinator.start_round()
        };
        let mut seeded = Vec::new();

        for attempt in 0..self.config.max_rounds {
            let result = self
                .run_round(coordinator, round, std::mem::take(&mut seeded), sequencer, ids)
                .await?;
            match result {
                RoundResult::Decided(outcome) => return Ok(outcome),
                RoundResult::Superseded {
                    round: newer,
                    enrollment,
                } => {
                    debug!("Round {} superseded by round {}", round, newer);
                    coordinator.enter_round(newer)?;
                    round = newer;
                    seeded.push(enrollment);
                }
                RoundResult::Undecided => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        "Election round {} for {} undecided (attempt {}), retrying in {:?}",
                        round,
                        coordinator.group(),
                        attempt + 1,
                        delay
                    );
                    sleep(delay).await;
                    round = coordinator.start_round();
                }
            }
        }

        error!(
            "Partition {} has no active coordinator after {} rounds",
            coordinator.group(),
            self.config.max_rounds
        );
        Err(Error::NoActiveCoordinator {
            group: coordinator.group(),
            rounds: self.config.max_rounds,
        })
    }

    async fn run_round(
        &self,
        coordinator: &mut ElectionCoordinator,
        round: u64,
        seeded: Vec<Enrollment>,
        sequencer: &TransactionSequencer,
        ids: &ObjectIdSequence,
    ) -> Result<RoundResult> {
        let own = self.candidate(coordinator.local().clone());
        let mut election = ElectionRound::new(coordinator.group(), round);
        election.enroll(own.clone())?;
        for enrollment in seeded {
            Self::accept(&mut election, enrollment);
        }

        info!(
            "Starting election round {} for {} with weights {:?}",
            round,
            coordinator.group(),
            own.weights()
        );
        self.transport
            .publish(round, own)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let deadline = Instant::now() + self.config.election_timeout;
        while !self.round_complete(&election) {
            let Ok(message) = timeout_at(deadline, self.transport.recv()).await else {
                break;
            };
            match message.map_err(|e| Error::Transport(e.to_string()))? {
                ElectionMessage::Enrollment { round: r, enrollment } if r == round => {
                    Self::accept(&mut election, enrollment);
                }
                ElectionMessage::Enrollment { round: r, enrollment } if r > round => {
                    return Ok(RoundResult::Superseded { round: r, enrollment });
                }
                ElectionMessage::Enrollment { round: r, enrollment } => {
                    debug!("Ignoring enrollment of {} for stale round {}", enrollment.node(), r);
                }
                ElectionMessage::Declaration { round: r, enrollment, point } if r >= round => {
                    if r == round && Self::challenged(&election, &enrollment) {
                        continue;
                    }
                    let active = enrollment.node().clone();
                    return Self::follow(coordinator, r, active, point, sequencer, ids)
                        .map(RoundResult::Decided);
                }
                ElectionMessage::Declaration { round: r, enrollment, .. } => {
                    debug!("Ignoring declaration of {} for stale round {}", enrollment.node(), r);
                }
            }
        }

        let Some(winner) = election.resolve().cloned() else {
            return Ok(RoundResult::Undecided);
        };
        debug!(
            "Round {} resolved with {} of {} enrollments: winner {}",
            round,
            election.enrollment_count(),
            coordinator.group(),
            winner.node()
        );

        if winner.node() == coordinator.local() {
            let point = ResumptionPoint::capture(sequencer, ids);
            coordinator.won(round, point)?;
            self.transport
                .declare_active(round, winner, point)
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            return Ok(RoundResult::Decided(ElectionOutcome::Won { round, point }));
        }

        let deadline = Instant::now() + self.config.election_timeout;
        loop {
            let Ok(message) = timeout_at(deadline, self.transport.recv()).await else {
                warn!(
                    "{} never declared itself active for round {}",
                    winner.node(),
                    round
                );
                return Ok(RoundResult::Undecided);
            };
            match message.map_err(|e| Error::Transport(e.to_string()))? {
                ElectionMessage::Declaration { round: r, enrollment, point } if r >= round => {
                    if r == round && Self::challenged(&election, &enrollment) {
                        continue;
                    }
                    if enrollment.node() != winner.node() {
                        warn!(
                            "Expected {} to win round {}, {} declared",
                            winner.node(),
                            round,
                            enrollment.node()
                        );
                    }
                    let active = enrollment.node().clone();
                    return Self::follow(coordinator, r, active, point, sequencer, ids)
                        .map(RoundResult::Decided);
                }
                ElectionMessage::Enrollment { round: r, enrollment } if r > round => {
                    return Ok(RoundResult::Superseded { round: r, enrollment });
                }
                ElectionMessage::Enrollment { enrollment, .. } => {
                    if let Err(e) = election.enroll(enrollment) {
                        debug!("Rejected late enrollment: {}", e);
                    }
                }
                ElectionMessage::Declaration { round: r, enrollment, .. } => {
                    debug!("Ignoring declaration of {} for stale round {}", enrollment.node(), r);
                }
            }
        }
    }

    fn challenged(election: &ElectionRound, declared: &Enrollment) -> bool {
        let Some(challenger) = election.challenger(declared) else {
            return false;
        };
        warn!(
            "Rejecting declaration of {} for round {}: outranked by {}",
            declared.node(),
            election.number(),
            challenger.node()
        );
        true
    }

    fn follow(
        coordinator: &mut ElectionCoordinator,
        round: u64,
        active: NodeId,
        point: ResumptionPoint,
        sequencer: &TransactionSequencer,
        ids: &ObjectIdSequence,
    ) -> Result<ElectionOutcome> {
        coordinator.lost(round, active.clone())?;
        point.apply(sequencer, ids);
        coordinator.observe_resumption(&active, point)?;
        Ok(ElectionOutcome::Lost {
            round,
            active,
            point,
        })
    }

    fn accept(election: &mut ElectionRound, enrollment: Enrollment) {
        if let Err(e) = election.enroll(enrollment) {
            warn!("Ignoring enrollment: {}", e);
        }
    }

    fn round_complete(&self, election: &ElectionRound) -> bool {
        self.config.expected_servers > 0 && election.enrollment_count() >= self.config.expected_servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::ConstantWeight;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tessera_identity::GroupId;
    use tracing_test::traced_test;

    #[derive(Debug, thiserror::Error)]
    #[error("silent transport closed")]
    struct Closed;

    /// A transport nobody else is listening on.
    #[derive(Default)]
    struct Silent {
        published: Mutex<Vec<u64>>,
        declared: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl ElectionTransport for Silent {
        type Error = Closed;

        async fn publish(&self, round: u64, _enrollment: Enrollment) -> std::result::Result<(), Closed> {
            self.published.lock().unwrap().push(round);
            Ok(())
        }

        async fn declare_active(
            &self,
            round: u64,
            _enrollment: Enrollment,
            _point: ResumptionPoint,
        ) -> std::result::Result<(), Closed> {
            self.declared.lock().unwrap().push(round);
            Ok(())
        }

        async fn recv(&self) -> std::result::Result<ElectionMessage, Closed> {
            std::future::pending().await
        }
    }

    fn config() -> ElectionConfig {
        ElectionConfig {
            election_timeout: Duration::from_millis(20),
            max_rounds: 3,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            expected_servers: 0,
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unopposed_candidate_wins_at_deadline() {
        let driver = ElectionDriver::new(
            Silent::default(),
            config(),
            Weights::new().with(ConstantWeight(1)),
            false,
        );
        let mut coordinator = ElectionCoordinator::new(NodeId::client(1), GroupId::new(0));
        let sequencer = TransactionSequencer::default();
        let ids = ObjectIdSequence::new(GroupId::new(0));

        let outcome = driver
            .run_election(&mut coordinator, &sequencer, &ids)
            .await
            .unwrap();

        assert!(matches!(outcome, ElectionOutcome::Won { round: 1, .. }));
        assert!(coordinator.is_active());
        assert_eq!(*driver.transport().published.lock().unwrap(), vec![1]);
        assert_eq!(*driver.transport().declared.lock().unwrap(), vec![1]);
        assert!(logs_contain("Starting election round 1"));
    }

    /// Answers every bid with a stronger one and never declares.
    struct Stubborn {
        rival: NodeId,
        queue: tokio::sync::Mutex<Vec<ElectionMessage>>,
    }

    #[async_trait]
    impl ElectionTransport for Stubborn {
        type Error = Closed;

        async fn publish(&self, round: u64, _enrollment: Enrollment) -> std::result::Result<(), Closed> {
            self.queue.lock().await.push(ElectionMessage::Enrollment {
                round,
                enrollment: Enrollment::new(self.rival.clone(), vec![u64::MAX], false),
            });
            Ok(())
        }

        async fn declare_active(
            &self,
            _round: u64,
            _enrollment: Enrollment,
            _point: ResumptionPoint,
        ) -> std::result::Result<(), Closed> {
            Err(Closed)
        }

        async fn recv(&self) -> std::result::Result<ElectionMessage, Closed> {
            if let Some(message) = self.queue.lock().await.pop() {
                return Ok(message);
            }
            std::future::pending().await
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_gives_up_after_max_rounds() {
        let driver = ElectionDriver::new(
            Stubborn {
                rival: NodeId::client(2),
                queue: tokio::sync::Mutex::new(Vec::new()),
            },
            config(),
            Weights::new().with(ConstantWeight(1)),
            false,
        );
        let mut coordinator = ElectionCoordinator::new(NodeId::client(1), GroupId::new(7));
        let sequencer = TransactionSequencer::default();
        let ids = ObjectIdSequence::new(GroupId::new(7));

        let result = driver.run_election(&mut coordinator, &sequencer, &ids).await;

        assert_eq!(
            result,
            Err(Error::NoActiveCoordinator {
                group: GroupId::new(7),
                rounds: 3
            })
        );
        assert!(!coordinator.can_serve());
        assert!(logs_contain("never declared itself active"));
        assert!(logs_contain("has no active coordinator"));
    }

    /// Replays a fixed sequence of peer messages, then goes quiet.
    struct Scripted {
        script: Mutex<VecDeque<ElectionMessage>>,
    }

    #[async_trait]
    impl ElectionTransport for Scripted {
        type Error = Closed;

        async fn publish(&self, _round: u64, _enrollment: Enrollment) -> std::result::Result<(), Closed> {
            Ok(())
        }

        async fn declare_active(
            &self,
            _round: u64,
            _enrollment: Enrollment,
            _point: ResumptionPoint,
        ) -> std::result::Result<(), Closed> {
            Err(Closed)
        }

        async fn recv(&self) -> std::result::Result<ElectionMessage, Closed> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(message) => Ok(message),
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_outranked_declaration_ignored() {
        let strong = Enrollment::new(NodeId::client(2), vec![u64::MAX], false);
        let weak = Enrollment::new(NodeId::client(3), vec![0], false);
        let point = ResumptionPoint::capture(
            &TransactionSequencer::default(),
            &ObjectIdSequence::new(GroupId::new(0)),
        );
        let script = [
            ElectionMessage::Enrollment {
                round: 1,
                enrollment: strong.clone(),
            },
            ElectionMessage::Declaration {
                round: 1,
                enrollment: weak,
                point,
            },
            ElectionMessage::Declaration {
                round: 1,
                enrollment: strong,
                point,
            },
        ];
        let driver = ElectionDriver::new(
            Scripted {
                script: Mutex::new(script.into_iter().collect()),
            },
            config(),
            Weights::new().with(ConstantWeight(1)),
            false,
        );
        let mut coordinator = ElectionCoordinator::new(NodeId::client(1), GroupId::new(0));
        let sequencer = TransactionSequencer::default();
        let ids = ObjectIdSequence::new(GroupId::new(0));

        let outcome = driver
            .run_election(&mut coordinator, &sequencer, &ids)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ElectionOutcome::Lost {
                round: 1,
                active: NodeId::client(2),
                point
            }
        );
        assert!(coordinator.can_serve());
        assert!(logs_contain("Rejecting declaration of client-3"));
    }
}
