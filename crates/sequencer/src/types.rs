//! Transaction identifier types

use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_identity::NodeId;

/// Cluster-wide position of a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalTransactionId(u64);

impl GlobalTransactionId {
    /// Sentinel meaning "none".
    pub const NULL: Self = Self(u64::MAX);

    /// Create a new global transaction ID
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Whether this is the "none" sentinel
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl fmt::Display for GlobalTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "gtx-null")
        } else {
            write!(f, "gtx-{}", self.0)
        }
    }
}

/// Transaction counter local to one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Create a new transaction ID
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// A transaction as known to the server: the originating node plus its local
/// transaction counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerTransactionId {
    source: NodeId,
    txn: TransactionId,
}

impl ServerTransactionId {
    /// Create a new server transaction ID
    #[must_use]
    pub const fn new(source: NodeId, txn: TransactionId) -> Self {
        Self { source, txn }
    }

    /// Originating node
    #[must_use]
    pub const fn source(&self) -> &NodeId {
        &self.source
    }

    /// Local transaction counter
    #[must_use]
    pub const fn txn(&self) -> TransactionId {
        self.txn
    }
}

impl fmt::Display for ServerTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.txn.0)
    }
}
