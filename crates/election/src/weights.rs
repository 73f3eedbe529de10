//! Sources of election metrics

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use tessera_sequencer::TransactionSequencer;

/// Produces one element of a candidate's metric vector.
pub trait WeightGenerator: Send + Sync {
    /// Current metric value; greater is better
    fn weight(&self) -> u64;
}

/// Favors the candidate that has sequenced the most transactions.
pub struct WatermarkWeight {
    sequencer: Arc<TransactionSequencer>,
}

impl WatermarkWeight {
    /// Weigh by `sequencer`'s next global transaction id
    #[must_use]
    pub const fn new(sequencer: Arc<TransactionSequencer>) -> Self {
        Self { sequencer }
    }
}

impl WeightGenerator for WatermarkWeight {
    fn weight(&self) -> u64 {
        let next = self.sequencer.next_global_transaction_id();
        if next.is_null() { u64::MAX } else { next.value() }
    }
}

/// Fixed operator-assigned weight.
pub struct ConstantWeight(pub u64);

impl WeightGenerator for ConstantWeight {
    fn weight(&self) -> u64 {
        self.0
    }
}

/// Random weight, drawn fresh for every bid.
pub struct RandomWeight;

impl WeightGenerator for RandomWeight {
    fn weight(&self) -> u64 {
        rand::thread_rng().r#gen()
    }
}

/// Ordered set of generators. The order is the comparison order of the
/// resulting vector and must be the same on every candidate.
#[derive(Default)]
pub struct Weights {
    generators: Vec<Box<dyn WeightGenerator>>,
}

impl Weights {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a generator as the next, less significant, metric
    #[must_use]
    pub fn with(mut self, generator: impl WeightGenerator + 'static) -> Self {
        self.generators.push(Box::new(generator));
        self
    }

    /// Produce a metric vector
    #[must_use]
    pub fn generate(&self) -> Vec<u64> {
        self.generators.iter().map(|g| g.weight()).collect()
    }

    /// Number of metrics
    #[must_use]
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    /// Whether no metrics are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl fmt::Debug for Weights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weights")
            .field("len", &self.generators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_identity::NodeId;
    use tessera_sequencer::{ServerTransactionId, TransactionId};

    #[test]
    fn test_generators_compose_in_order() {
        let sequencer = Arc::new(TransactionSequencer::default());
        let weights = Weights::new()
            .with(WatermarkWeight::new(Arc::clone(&sequencer)))
            .with(ConstantWeight(9))
            .with(RandomWeight);

        let first = weights.generate();
        assert_eq!(first.len(), 3);
        assert_eq!(first[1], 9);

        for txn in 0..4 {
            let stx = ServerTransactionId::new(NodeId::client(1), TransactionId::new(txn));
            sequencer.get_or_create_global_transaction_id(&stx).unwrap();
            sequencer.commit(&stx).unwrap();
        }
        let second = weights.generate();
        assert_eq!(second[0], first[0] + 4);
    }
}
