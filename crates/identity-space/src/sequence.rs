//! Batch allocation of object identifiers.
//!
//! A coordinator owns one `ObjectIdSequence` per group and hands out
//! contiguous ranges. Participants hold an `ObjectIdBatch` and mint ids from
//! it locally until it runs dry.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::counter::MonotonicCounter;
use crate::error::{Error, Result};
use crate::object_id::{GroupId, MAX_SEQUENCE, ObjectId};

/// Authoritative allocator for one group's object id space.
#[derive(Debug)]
pub struct ObjectIdSequence {
    group: GroupId,
    counter: MonotonicCounter,
}

impl ObjectIdSequence {
    /// Create a sequence for `group` starting at sequence 0.
    #[must_use]
    pub const fn new(group: GroupId) -> Self {
        Self::starting_at(group, 0)
    }

    /// Create a sequence for `group` whose next id has sequence `next`.
    ///
    /// # Panics
    ///
    /// Panics if `group` is the null group.
    #[must_use]
    pub const fn starting_at(group: GroupId, next: u64) -> Self {
        assert!(!group.is_null(), "object id sequence requires a non-null group");
        Self {
            group,
            counter: MonotonicCounter::new(next, MAX_SEQUENCE + 1),
        }
    }

    /// Group this sequence allocates for
    #[must_use]
    pub const fn group(&self) -> GroupId {
        self.group
    }

    /// Reserve `batch_size` ids and return the first one.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero batch size or when the group's sequence
    /// space cannot hold the batch.
    pub fn next_batch(&self, batch_size: u64) -> Result<ObjectId> {
        self.reserve_batch(batch_size).map(|batch| batch.first())
    }

    /// Reserve `batch_size` ids as a batch that can mint them locally.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero batch size or when the group's sequence
    /// space cannot hold the batch.
    pub fn reserve_batch(&self, batch_size: u64) -> Result<ObjectIdBatch> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize(batch_size));
        }

        let range = self.counter.reserve(batch_size).ok_or_else(|| {
            warn!(
                "Object id space exhausted for {} (requested {})",
                self.group, batch_size
            );
            Error::ObjectIdSpaceExhausted {
                group: self.group.value(),
                requested: batch_size,
            }
        })?;

        debug!(
            "Reserved object ids {}..{} for {}",
            range.start, range.end, self.group
        );

        Ok(ObjectIdBatch {
            group: self.group,
            next: range.start,
            start: range.start,
            end: range.end,
        })
    }

    /// The next id that has not been reserved by anyone.
    ///
    /// Returns `ObjectId::NULL` once the whole space is reserved.
    #[must_use]
    pub fn current(&self) -> ObjectId {
        let next = self.counter.current();
        if next > MAX_SEQUENCE {
            ObjectId::NULL
        } else {
            ObjectId::encode(next, self.group)
        }
    }

    /// Continue from a cursor published by a previous owner.
    ///
    /// # Panics
    ///
    /// Panics if the cursor belongs to a different group.
    pub fn resume_from(&self, cursor: ObjectId) {
        if cursor.is_null() {
            self.counter.advance_to(MAX_SEQUENCE + 1);
            return;
        }
        assert_eq!(
            cursor.group(),
            self.group,
            "cursor from another group cannot be resumed"
        );
        self.counter.advance_to(cursor.sequence());
    }
}

/// A contiguous range of reserved object ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdBatch {
    group: GroupId,
    start: u64,
    next: u64,
    end: u64,
}

impl ObjectIdBatch {
    /// First id in the batch
    #[must_use]
    pub const fn first(&self) -> ObjectId {
        ObjectId::encode(self.start, self.group)
    }

    /// Number of ids the batch was reserved with
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Ids not yet handed out
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.end - self.next
    }

    /// Whether `id` falls inside this batch
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        id.group() == self.group && (self.start..self.end).contains(&id.sequence())
    }

    /// Hand out the next id, or `None` when the batch is used up.
    pub fn next_id(&mut self) -> Option<ObjectId> {
        if self.next == self.end {
            return None;
        }
        let id = ObjectId::encode(self.next, self.group);
        self.next += 1;
        Some(id)
    }
}

/// Source of object id batches, usually the coordinator reached over the
/// network.
#[async_trait]
pub trait ObjectIdSource: Send + Sync + 'static {
    /// Reserve a batch of `batch_size` ids.
    async fn request_batch(&self, batch_size: u64) -> Result<ObjectIdBatch>;
}

#[async_trait]
impl ObjectIdSource for ObjectIdSequence {
    async fn request_batch(&self, batch_size: u64) -> Result<ObjectIdBatch> {
        self.reserve_batch(batch_size)
    }
}

/// Participant-side allocator that refills from an `ObjectIdSource` only
/// when its current batch is exhausted.
pub struct ObjectIdAllocator<S>
where
    S: ObjectIdSource,
{
    source: S,
    batch_size: u64,
    current: Mutex<Option<ObjectIdBatch>>,
}

impl<S> ObjectIdAllocator<S>
where
    S: ObjectIdSource,
{
    /// Create an allocator requesting `batch_size` ids at a time.
    pub fn new(source: S, batch_size: u64) -> Self {
        Self {
            source,
            batch_size,
            current: Mutex::new(None),
        }
    }

    /// Next object id, fetching a new batch when needed.
    ///
    /// # Errors
    ///
    /// Propagates errors from the batch source.
    pub async fn next_object_id(&self) -> Result<ObjectId> {
        let mut current = self.current.lock().await;

        if let Some(id) = current.as_mut().and_then(ObjectIdBatch::next_id) {
            return Ok(id);
        }

        let mut batch = self.source.request_batch(self.batch_size).await?;
        let id = batch
            .next_id()
            .ok_or(Error::InvalidBatchSize(batch.size()))?;
        *current = Some(batch);
        Ok(id)
    }
}
