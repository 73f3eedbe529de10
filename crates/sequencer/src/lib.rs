//! Cluster-wide transaction ordering.
//!
//! The `TransactionSequencer` stamps each committed transaction with a
//! `GlobalTransactionId` and tracks the low watermark below which committed
//! history may be truncated.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod sequencer;
mod types;

pub use config::SequencerConfig;
pub use error::{Error, Result};
pub use sequencer::{OutstandingTransaction, StalledNode, TransactionSequencer, VoidReport};
pub use types::{GlobalTransactionId, ServerTransactionId, TransactionId};
