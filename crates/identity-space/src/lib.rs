//! Cluster-wide identity types for Tessera.
//!
//! This crate provides:
//! - Participant identities (`NodeId` and its client/group/server variants)
//! - Packed object identifiers (`ObjectId`, `GroupId`)
//! - Batch allocation of object identifiers (`ObjectIdSequence`, `ObjectIdAllocator`)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod counter;
mod error;
mod node_id;
mod object_id;
mod sequence;

pub use counter::MonotonicCounter;
pub use error::{Error, Result};
pub use node_id::{ClientId, NodeId, ServerId};
pub use object_id::{GroupId, MAX_SEQUENCE, ObjectId};
pub use sequence::{ObjectIdAllocator, ObjectIdBatch, ObjectIdSequence, ObjectIdSource};
