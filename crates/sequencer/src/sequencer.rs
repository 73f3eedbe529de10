//! Global transaction id assignment and low watermark tracking.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tessera_identity::{MonotonicCounter, NodeId};
use tracing::{debug, error, info, warn};

use crate::config::SequencerConfig;
use crate::error::{Error, Result};
use crate::types::{GlobalTransactionId, ServerTransactionId, TransactionId};

/// One transaction that holds back the low watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingTransaction {
    /// Transaction as known to the server
    pub server_txn: ServerTransactionId,
    /// Assigned global id
    pub global_id: GlobalTransactionId,
    /// Whether the transaction has been applied and committed
    pub committed: bool,
}

/// A departed node whose unresolved transactions are stalling the watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledNode {
    /// The departed node
    pub node: NodeId,
    /// When the departure was recorded
    pub departed_at: Instant,
    /// Number of outstanding transactions it still holds
    pub outstanding: usize,
    /// Lowest global id it holds
    pub oldest: GlobalTransactionId,
}

/// Outcome of explicitly resolving a departed node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoidReport {
    /// Transactions that never committed and were discarded
    pub voided: Vec<ServerTransactionId>,
    /// Committed transactions that were cleared from the outstanding set
    pub completed: Vec<ServerTransactionId>,
}

#[derive(Debug)]
struct Descriptor {
    global_id: GlobalTransactionId,
    committed: bool,
}

#[derive(Debug, Default)]
struct SequencerState {
    descriptors: HashMap<ServerTransactionId, Descriptor>,
    outstanding: BTreeMap<GlobalTransactionId, ServerTransactionId>,
    departed: HashMap<NodeId, Instant>,
}

impl SequencerState {
    fn low_watermark(&self) -> GlobalTransactionId {
        self.outstanding
            .keys()
            .next()
            .copied()
            .unwrap_or(GlobalTransactionId::NULL)
    }

    fn remove(&mut self, server_txn: &ServerTransactionId) -> Option<Descriptor> {
        let descriptor = self.descriptors.remove(server_txn)?;
        self.outstanding.remove(&descriptor.global_id);
        Some(descriptor)
    }

    fn held_by(&self, node: &NodeId) -> Vec<(ServerTransactionId, GlobalTransactionId, bool)> {
        let mut held: Vec<_> = self
            .descriptors
            .iter()
            .filter(|(server_txn, _)| server_txn.source() == node)
            .map(|(server_txn, d)| (server_txn.clone(), d.global_id, d.committed))
            .collect();
        held.sort_by_key(|(_, global_id, _)| *global_id);
        held
    }
}

/// Single authority for global transaction ordering.
///
/// Every read-modify-write runs under one mutex. The watermark is mirrored
/// in an atomic so truncation decisions can read it without locking.
#[derive(Debug)]
pub struct TransactionSequencer {
    config: SequencerConfig,
    ids: MonotonicCounter,
    state: Mutex<SequencerState>,
    watermark: AtomicU64,
}

impl TransactionSequencer {
    /// Create a sequencer whose first global id is 1.
    #[must_use]
    pub fn new(config: SequencerConfig) -> Self {
        Self::starting_at(config, GlobalTransactionId::new(1))
    }

    /// Create a sequencer whose next global id is `next`.
    #[must_use]
    pub fn starting_at(config: SequencerConfig, next: GlobalTransactionId) -> Self {
        Self {
            config,
            ids: MonotonicCounter::new(next.value(), GlobalTransactionId::NULL.value()),
            state: Mutex::new(SequencerState::default()),
            watermark: AtomicU64::new(GlobalTransactionId::NULL.value()),
        }
    }

    /// Return the global id for `server_txn`, assigning one on first sight.
    ///
    /// Repeated calls with the same transaction return the same id.
    ///
    /// # Errors
    ///
    /// Fails if the originating node has departed or the id space is used up.
    pub fn get_or_create_global_transaction_id(
        &self,
        server_txn: &ServerTransactionId,
    ) -> Result<GlobalTransactionId> {
        let mut state = self.state.lock();

        if let Some(descriptor) = state.descriptors.get(server_txn) {
            debug!(
                "Duplicate commit for {}, returning {}",
                server_txn, descriptor.global_id
            );
            return Ok(descriptor.global_id);
        }

        if state.departed.contains_key(server_txn.source()) {
            return Err(Error::NodeDeparted(server_txn.source().clone()));
        }

        let global_id = self
            .ids
            .next()
            .map(GlobalTransactionId::new)
            .ok_or(Error::SequenceExhausted)?;

        state.descriptors.insert(
            server_txn.clone(),
            Descriptor {
                global_id,
                committed: false,
            },
        );
        state.outstanding.insert(global_id, server_txn.clone());
        self.publish_watermark(&state);

        debug!("Assigned {} to {}", global_id, server_txn);
        Ok(global_id)
    }

    /// Mark a transaction as applied and committed. It stays outstanding
    /// until cleared.
    ///
    /// # Errors
    ///
    /// Fails if no global id was assigned to the transaction.
    pub fn commit(&self, server_txn: &ServerTransactionId) -> Result<GlobalTransactionId> {
        let mut state = self.state.lock();
        let descriptor = state
            .descriptors
            .get_mut(server_txn)
            .ok_or_else(|| Error::UnknownTransaction(server_txn.clone()))?;
        descriptor.committed = true;
        Ok(descriptor.global_id)
    }

    /// Whether the transaction is known and committed
    #[must_use]
    pub fn is_committed(&self, server_txn: &ServerTransactionId) -> bool {
        self.state
            .lock()
            .descriptors
            .get(server_txn)
            .is_some_and(|d| d.committed)
    }

    /// Global id assigned to a transaction, if any
    #[must_use]
    pub fn global_id_of(&self, server_txn: &ServerTransactionId) -> Option<GlobalTransactionId> {
        self.state
            .lock()
            .descriptors
            .get(server_txn)
            .map(|d| d.global_id)
    }

    /// Remove a transaction from the outstanding set and return the new low
    /// watermark. Clearing an unknown transaction is a no-op.
    pub fn clear(&self, server_txn: &ServerTransactionId) -> GlobalTransactionId {
        self.clear_and_truncate(server_txn, |watermark| watermark)
    }

    /// Clear a transaction and run `truncate` with the recomputed watermark
    /// before any other sequencer operation can observe or move it.
    pub fn clear_and_truncate<R>(
        &self,
        server_txn: &ServerTransactionId,
        truncate: impl FnOnce(GlobalTransactionId) -> R,
    ) -> R {
        let mut state = self.state.lock();
        if state.remove(server_txn).is_some() {
            self.publish_watermark(&state);
        }
        truncate(state.low_watermark())
    }

    /// Void a transaction that never committed. Committed transactions are
    /// left untouched; returns whether anything was voided.
    pub fn void(&self, server_txn: &ServerTransactionId) -> bool {
        let mut state = self.state.lock();
        match state.descriptors.get(server_txn) {
            Some(descriptor) if !descriptor.committed => {
                state.remove(server_txn);
                self.publish_watermark(&state);
                debug!("Voided uncommitted transaction {}", server_txn);
                true
            }
            _ => false,
        }
    }

    /// Clear every committed transaction whose global id is below
    /// `watermark`, as reported by a peer that has applied them. Returns the
    /// number of transactions cleared.
    pub fn clear_committed_below(&self, watermark: GlobalTransactionId) -> usize {
        let mut state = self.state.lock();

        let cleared: Vec<ServerTransactionId> = state
            .outstanding
            .range(..watermark)
            .filter(|(_, server_txn)| state.descriptors.get(*server_txn).is_some_and(|d| d.committed))
            .map(|(_, server_txn)| server_txn.clone())
            .collect();

        for server_txn in &cleared {
            state.remove(server_txn);
        }
        if !cleared.is_empty() {
            self.publish_watermark(&state);
        }
        cleared.len()
    }

    /// Clear the committed transactions of `client` whose local id is below
    /// `below`, once the client reports it no longer needs their outcome.
    /// Uncommitted ones stay outstanding. Returns the number cleared.
    pub fn clear_committed_below_for(&self, client: &NodeId, below: TransactionId) -> usize {
        let mut state = self.state.lock();

        let cleared: Vec<ServerTransactionId> = state
            .descriptors
            .iter()
            .filter(|(server_txn, descriptor)| {
                descriptor.committed && server_txn.source() == client && server_txn.txn() < below
            })
            .map(|(server_txn, _)| server_txn.clone())
            .collect();

        for server_txn in &cleared {
            state.remove(server_txn);
        }
        if !cleared.is_empty() {
            debug!(
                "Cleared {} committed transactions of {} below {}",
                cleared.len(),
                client,
                below.value()
            );
            self.publish_watermark(&state);
        }
        cleared.len()
    }

    /// Smallest outstanding global id, or `NULL` if none are outstanding.
    #[must_use]
    pub fn low_watermark(&self) -> GlobalTransactionId {
        self.state.lock().low_watermark()
    }

    /// Lock-free read of the last published low watermark.
    #[must_use]
    pub fn watermark_snapshot(&self) -> GlobalTransactionId {
        GlobalTransactionId::new(self.watermark.load(Ordering::Acquire))
    }

    /// Next global id that will be assigned
    #[must_use]
    pub fn next_global_transaction_id(&self) -> GlobalTransactionId {
        GlobalTransactionId::new(self.ids.current())
    }

    /// Continue numbering at or above `next`, as published by a previous
    /// active coordinator. Never moves backwards.
    pub fn resume_from(&self, next: GlobalTransactionId) {
        if !next.is_null() {
            self.ids.advance_to(next.value());
        }
    }

    /// Number of outstanding transactions
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    /// Outstanding transactions originating from `node`, lowest id first.
    #[must_use]
    pub fn outstanding_for(&self, node: &NodeId) -> Vec<OutstandingTransaction> {
        self.state
            .lock()
            .held_by(node)
            .into_iter()
            .map(|(server_txn, global_id, committed)| OutstandingTransaction {
                server_txn,
                global_id,
                committed,
            })
            .collect()
    }

    /// Record that `node` has left the cluster. Its unresolved transactions
    /// must be voided or completed through [`Self::void_node`]; until then they
    /// keep holding the watermark.
    pub fn node_departed(&self, node: &NodeId, now: Instant) {
        let mut state = self.state.lock();
        let held = state.held_by(node).len();
        state.departed.entry(node.clone()).or_insert(now);
        info!(
            "Node {} departed with {} outstanding transactions",
            node, held
        );
    }

    /// Departed nodes whose timeout has elapsed while they still hold
    /// outstanding transactions. These need administrative action; they are
    /// never resolved automatically.
    pub fn stalled_departures(&self, now: Instant) -> Vec<StalledNode> {
        let state = self.state.lock();
        let mut stalled = Vec::new();

        for (node, departed_at) in &state.departed {
            if now.saturating_duration_since(*departed_at) < self.config.departure_timeout {
                continue;
            }
            let held = state.held_by(node);
            let Some((_, oldest, _)) = held.first() else {
                continue;
            };
            error!(
                "Low watermark stalled: departed node {} still holds {} transactions (oldest {})",
                node,
                held.len(),
                oldest
            );
            stalled.push(StalledNode {
                node: node.clone(),
                departed_at: *departed_at,
                outstanding: held.len(),
                oldest: *oldest,
            });
        }

        stalled.sort_by_key(|s| s.oldest);
        stalled
    }

    /// Resolve a departed node: void its uncommitted transactions and clear
    /// its committed ones.
    pub fn void_node(&self, node: &NodeId) -> VoidReport {
        let mut state = self.state.lock();
        let mut report = VoidReport::default();

        for (server_txn, _, committed) in state.held_by(node) {
            state.remove(&server_txn);
            if committed {
                report.completed.push(server_txn);
            } else {
                report.voided.push(server_txn);
            }
        }
        state.departed.remove(node);
        self.publish_watermark(&state);

        warn!(
            "Resolved departed node {}: {} voided, {} completed",
            node,
            report.voided.len(),
            report.completed.len()
        );
        report
    }

    fn publish_watermark(&self, state: &SequencerState) {
        self.watermark
            .store(state.low_watermark().value(), Ordering::Release);
    }
}

impl Default for TransactionSequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn stx(client: u64, txn: u64) -> ServerTransactionId {
        ServerTransactionId::new(NodeId::client(client), TransactionId::new(txn))
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let sequencer = TransactionSequencer::default();
        let first = sequencer.get_or_create_global_transaction_id(&stx(1, 1)).unwrap();
        let again = sequencer.get_or_create_global_transaction_id(&stx(1, 1)).unwrap();
        let other = sequencer.get_or_create_global_transaction_id(&stx(1, 2)).unwrap();

        assert_eq!(first, again);
        assert!(other > first);
        assert_eq!(sequencer.outstanding_count(), 2);
    }

    #[test]
    fn test_watermark_tracks_minimum_and_resets_to_null() {
        let sequencer = TransactionSequencer::default();
        assert_eq!(sequencer.low_watermark(), GlobalTransactionId::NULL);

        let ids: Vec<_> = (0..5)
            .map(|i| sequencer.get_or_create_global_transaction_id(&stx(1, i)).unwrap())
            .collect();
        assert_eq!(sequencer.low_watermark(), ids[0]);

        // Clearing out of order only advances once the minimum goes.
        sequencer.clear(&stx(1, 2));
        assert_eq!(sequencer.low_watermark(), ids[0]);
        sequencer.clear(&stx(1, 0));
        assert_eq!(sequencer.low_watermark(), ids[1]);

        for i in 0..5 {
            sequencer.clear(&stx(1, i));
        }
        assert_eq!(sequencer.low_watermark(), GlobalTransactionId::NULL);
        assert_eq!(sequencer.watermark_snapshot(), GlobalTransactionId::NULL);
    }

    #[test]
    fn test_watermark_never_exceeds_outstanding() {
        let sequencer = TransactionSequencer::default();
        let mut last = GlobalTransactionId::new(0);

        for i in 0..20u64 {
            sequencer.get_or_create_global_transaction_id(&stx(i % 3, i)).unwrap();
            if i >= 2 && i % 2 == 0 {
                sequencer.clear(&stx((i - 2) % 3, i - 2));
            }

            let watermark = sequencer.low_watermark();
            assert!(!watermark.is_null());
            for held in (0..3).flat_map(|n| sequencer.outstanding_for(&NodeId::client(n))) {
                assert!(watermark <= held.global_id);
            }
            assert!(watermark >= last);
            last = watermark;
        }
    }

    #[test]
    fn test_clear_and_truncate_sees_new_watermark() {
        let sequencer = TransactionSequencer::default();
        let a = sequencer.get_or_create_global_transaction_id(&stx(1, 1)).unwrap();
        let b = sequencer.get_or_create_global_transaction_id(&stx(1, 2)).unwrap();

        let truncated_below = sequencer.clear_and_truncate(&stx(1, 1), |watermark| watermark);
        assert_eq!(truncated_below, b);
        assert!(a < truncated_below);
        assert_eq!(sequencer.watermark_snapshot(), b);
    }

    #[test]
    fn test_clear_committed_below_skips_uncommitted() {
        let sequencer = TransactionSequencer::default();
        for i in 0..4 {
            sequencer.get_or_create_global_transaction_id(&stx(1, i)).unwrap();
        }
        sequencer.commit(&stx(1, 0)).unwrap();
        sequencer.commit(&stx(1, 2)).unwrap();
        let limit = sequencer.global_id_of(&stx(1, 3)).unwrap();

        assert_eq!(sequencer.clear_committed_below(limit), 2);
        assert_eq!(
            sequencer.low_watermark(),
            sequencer.global_id_of(&stx(1, 1)).unwrap()
        );
    }

    #[test]
    fn test_clear_committed_below_for_one_client() {
        let sequencer = TransactionSequencer::default();
        for client in 1..=2 {
            for i in 0..4 {
                sequencer.get_or_create_global_transaction_id(&stx(client, i)).unwrap();
                if i != 1 {
                    sequencer.commit(&stx(client, i)).unwrap();
                }
            }
        }
        let first = sequencer.low_watermark();

        let cleared =
            sequencer.clear_committed_below_for(&NodeId::client(1), TransactionId::new(3));
        assert_eq!(cleared, 2);
        assert!(sequencer.global_id_of(&stx(1, 0)).is_none());
        assert!(sequencer.global_id_of(&stx(1, 2)).is_none());
        assert!(sequencer.global_id_of(&stx(1, 3)).is_some());
        assert_eq!(sequencer.outstanding_for(&NodeId::client(2)).len(), 4);
        assert_eq!(
            sequencer.low_watermark(),
            sequencer.global_id_of(&stx(1, 1)).unwrap()
        );
        assert!(sequencer.low_watermark() > first);
        assert_eq!(sequencer.watermark_snapshot(), sequencer.low_watermark());

        assert_eq!(
            sequencer.clear_committed_below_for(&NodeId::client(1), TransactionId::new(3)),
            0
        );
    }

    #[test]
    fn test_void_leaves_committed_alone() {
        let sequencer = TransactionSequencer::default();
        sequencer.get_or_create_global_transaction_id(&stx(1, 1)).unwrap();
        sequencer.get_or_create_global_transaction_id(&stx(1, 2)).unwrap();
        sequencer.commit(&stx(1, 1)).unwrap();

        assert!(!sequencer.void(&stx(1, 1)));
        assert!(sequencer.void(&stx(1, 2)));
        assert!(!sequencer.void(&stx(1, 2)));
        assert_eq!(sequencer.outstanding_count(), 1);
    }

    #[test]
    fn test_commit_unknown_transaction_fails() {
        let sequencer = TransactionSequencer::default();
        assert_matches!(
            sequencer.commit(&stx(9, 9)),
            Err(Error::UnknownTransaction(_))
        );
    }

    #[test]
    #[traced_test]
    fn test_departed_node_stalls_until_voided() {
        let sequencer = TransactionSequencer::new(SequencerConfig {
            departure_timeout: Duration::from_secs(10),
        });
        let gone = NodeId::client(7);
        sequencer.get_or_create_global_transaction_id(&stx(7, 1)).unwrap();
        sequencer.get_or_create_global_transaction_id(&stx(7, 2)).unwrap();
        sequencer.commit(&stx(7, 1)).unwrap();
        let live = sequencer.get_or_create_global_transaction_id(&stx(8, 1)).unwrap();

        let departed_at = Instant::now();
        sequencer.node_departed(&gone, departed_at);

        assert_matches!(
            sequencer.get_or_create_global_transaction_id(&stx(7, 3)),
            Err(Error::NodeDeparted(_))
        );
        assert!(sequencer.stalled_departures(departed_at).is_empty());

        let later = departed_at + Duration::from_secs(11);
        let stalled = sequencer.stalled_departures(later);
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].node, gone);
        assert_eq!(stalled[0].outstanding, 2);
        assert!(logs_contain("Low watermark stalled"));

        let report = sequencer.void_node(&gone);
        assert_eq!(report.completed, vec![stx(7, 1)]);
        assert_eq!(report.voided, vec![stx(7, 2)]);
        assert_eq!(sequencer.low_watermark(), live);
        assert!(sequencer.stalled_departures(later).is_empty());
    }

    #[test]
    fn test_resume_continues_above_previous_owner() {
        let sequencer = TransactionSequencer::default();
        sequencer.resume_from(GlobalTransactionId::new(1000));
        let id = sequencer.get_or_create_global_transaction_id(&stx(1, 1)).unwrap();
        assert_eq!(id, GlobalTransactionId::new(1000));
        assert_eq!(
            sequencer.next_global_transaction_id(),
            GlobalTransactionId::new(1001)
        );
    }
}
