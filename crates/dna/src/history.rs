//! Ordered, id-keyed logs and the merge used to layer them

use std::collections::BTreeMap;
use std::fmt::Debug;

use tessera_identity::ObjectId;
use tessera_sequencer::GlobalTransactionId;
use tracing::{debug, warn};

use crate::dna::Dna;
use crate::error::{Error, Result};
use crate::state::ObjectState;

/// What to do when an incoming entry shares an id with an existing entry but
/// carries a different payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Keep the existing payload and log the conflict
    KeepExisting,
    /// Fail the whole merge with [`Error::ConflictingEntry`]
    #[default]
    RejectConflicts,
}

/// Counts produced by a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Entries inserted
    pub inserted: usize,
    /// Entries skipped because the id was already present
    pub skipped: usize,
    /// Skipped entries whose payload differed from the existing one
    pub conflicts: usize,
}

/// Layer `incoming` into `existing`, which must be sorted by strictly
/// ascending id.
///
/// An incoming entry whose id is already present is skipped; any other entry
/// is inserted at its ordered position. Under
/// [`MergePolicy::RejectConflicts`] nothing is modified when any skipped
/// entry differs from the one it collides with.
///
/// # Errors
///
/// Returns [`Error::ConflictingEntry`] under `RejectConflicts` when two
/// entries share an id but not a payload.
pub fn merge_sorted<K, V>(
    existing: &mut Vec<(K, V)>,
    incoming: Vec<(K, V)>,
    policy: MergePolicy,
) -> Result<MergeOutcome>
where
    K: Ord + Copy + Debug,
    V: PartialEq,
{
    debug_assert!(
        existing.windows(2).all(|w| w[0].0 < w[1].0),
        "existing log must be strictly ascending"
    );

    let mut seen: BTreeMap<K, &V> = BTreeMap::new();
    let mut conflicts = Vec::new();
    for (id, payload) in &incoming {
        let prior = existing
            .binary_search_by(|(e, _)| e.cmp(id))
            .ok()
            .map(|i| &existing[i].1)
            .or_else(|| seen.get(id).copied());
        match prior {
            Some(prior) if prior != payload => conflicts.push(*id),
            Some(_) => {}
            None => {
                seen.insert(*id, payload);
            }
        }
    }

    if let Some(first) = conflicts.first() {
        match policy {
            MergePolicy::RejectConflicts => {
                return Err(Error::ConflictingEntry(format!("{first:?}")));
            }
            MergePolicy::KeepExisting => {
                warn!("Conflicting entries kept as existing for ids {conflicts:?}");
            }
        }
    }
    drop(seen);

    let mut outcome = MergeOutcome {
        conflicts: conflicts.len(),
        ..MergeOutcome::default()
    };
    for (id, payload) in incoming {
        let pos = existing.partition_point(|(e, _)| *e < id);
        if existing.get(pos).is_some_and(|(e, _)| *e == id) {
            outcome.skipped += 1;
        } else {
            existing.insert(pos, (id, payload));
            outcome.inserted += 1;
        }
    }
    Ok(outcome)
}

/// Ordered DNA log of one object, keyed by the transaction that produced
/// each record.
#[derive(Debug, Clone)]
pub struct DnaHistory {
    object_id: ObjectId,
    entries: Vec<(GlobalTransactionId, Dna)>,
}

impl DnaHistory {
    /// Empty history for `object_id`
    #[must_use]
    pub const fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            entries: Vec::new(),
        }
    }

    /// Object this history belongs to
    #[must_use]
    pub const fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Append or insert one record.
    ///
    /// # Errors
    ///
    /// Fails if the record targets another object or collides with a
    /// different record under the same transaction.
    pub fn record(&mut self, txn: GlobalTransactionId, dna: Dna) -> Result<()> {
        self.layer(vec![(txn, dna)], MergePolicy::RejectConflicts)
            .map(|_| ())
    }

    /// Layer another ordered log over this one.
    ///
    /// # Errors
    ///
    /// Fails if any record targets another object, or on a conflict under
    /// [`MergePolicy::RejectConflicts`].
    pub fn layer(
        &mut self,
        incoming: Vec<(GlobalTransactionId, Dna)>,
        policy: MergePolicy,
    ) -> Result<MergeOutcome> {
        if let Some((_, dna)) = incoming.iter().find(|(_, d)| d.object_id() != self.object_id) {
            return Err(Error::ObjectMismatch {
                expected: self.object_id,
                found: dna.object_id(),
            });
        }
        let outcome = merge_sorted(&mut self.entries, incoming, policy)?;
        debug!(
            "Layered history of {}: {} inserted, {} skipped",
            self.object_id, outcome.inserted, outcome.skipped
        );
        Ok(outcome)
    }

    /// Drop records below `watermark`; returns how many were removed.
    pub fn truncate_below(&mut self, watermark: GlobalTransactionId) -> usize {
        let cut = self.entries.partition_point(|(id, _)| *id < watermark);
        self.entries.drain(..cut).count()
    }

    /// Apply every record newer than `state`'s version, in transaction order.
    /// Returns how many were applied.
    ///
    /// # Errors
    ///
    /// Stops at the first record that fails to apply.
    pub fn replay(&self, state: &mut ObjectState) -> Result<usize> {
        let mut applied = 0;
        for (_, dna) in &self.entries {
            if state.version().is_some_and(|v| dna.version() <= v) {
                continue;
            }
            state.apply(dna)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Records in transaction order
    pub fn iter(&self) -> impl Iterator<Item = &(GlobalTransactionId, Dna)> {
        self.entries.iter()
    }

    /// Transaction ids in order
    pub fn transaction_ids(&self) -> impl Iterator<Item = GlobalTransactionId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
