//! Lock level vocabulary and the abstract interface of the cluster lock manager.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod level;

pub use level::LockLevel;

use std::error::Error;
use std::fmt::{self, Debug};

use async_trait::async_trait;

/// Marker trait for `LockManager` errors
pub trait LockManagerError: Debug + Error + Send + Sync + 'static {}

/// Identifies one cluster-wide lock.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(String);

impl LockId {
    /// Create a new lock ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Lock name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated request for a lock at a given level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    lock_id: LockId,
    level: LockLevel,
}

impl LockRequest {
    /// Create a request.
    ///
    /// # Panics
    ///
    /// Panics unless `level` is a discrete level, optionally carrying the
    /// GREEDY modifier.
    #[must_use]
    pub fn new(lock_id: LockId, level: LockLevel) -> Self {
        assert!(
            level.base().is_discrete(),
            "lock request for {lock_id} needs a discrete level, got {level}"
        );
        Self { lock_id, level }
    }

    /// Requested lock
    #[must_use]
    pub const fn lock_id(&self) -> &LockId {
        &self.lock_id
    }

    /// Requested level
    #[must_use]
    pub const fn level(&self) -> LockLevel {
        self.level
    }
}

/// Represents the current status of a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// The lock is free.
    Free,

    /// The lock is held by another participant, identified by the String.
    HeldByOther(String, LockLevel),

    /// The lock is held by the current participant.
    HeldBySelf(LockLevel),
}

/// A cluster lock manager with asynchronous operations.
///
/// Grant compatibility between levels is entirely the implementation's
/// policy. Locks are represented by a guard type that releases the lock when
/// dropped; a greedy grant stays cached by the holder after the guard drops
/// until the manager recalls it or the holder unlocks it explicitly.
#[async_trait]
pub trait LockManager: Send + Sync + 'static {
    /// The error type for lock operations.
    type Error: LockManagerError + Send + Sync + 'static;

    /// The guard type that releases the lock on drop.
    type Guard: Send + Sync + 'static;

    /// Checks the status of a lock.
    async fn check(&self, lock_id: LockId) -> Result<LockStatus, Self::Error>;

    /// Acquires a lock, waiting until the manager grants the requested level.
    async fn lock(&self, request: LockRequest) -> Result<Self::Guard, Self::Error>;

    /// Attempts to acquire a lock without waiting.
    ///
    /// Returns `Ok(None)` if the level cannot be granted right now.
    async fn try_lock(&self, request: LockRequest) -> Result<Option<Self::Guard>, Self::Error>;

    /// Releases the lock held through `guard`, including a cached greedy
    /// grant.
    async fn unlock(&self, guard: Self::Guard) -> Result<(), Self::Error>;

    /// Recalls a greedy grant so the holder gives the lock back.
    async fn recall(&self, lock_id: LockId) -> Result<(), Self::Error>;
}
