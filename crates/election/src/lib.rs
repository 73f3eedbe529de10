//! Active/passive coordinator election for one partition.
//!
//! This crate provides:
//! - `Enrollment` - a candidate's bid and its total ordering
//! - `ElectionRound` - collection and resolution of one round's bids
//! - `ElectionCoordinator` - the per-partition election state machine
//! - `ElectionDriver` - the async round loop over an `ElectionTransport`
//! - `WeightGenerator` - sources of the metrics a candidate bids with
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod coordinator;
mod driver;
mod enrollment;
mod error;
mod round;
mod weights;

pub use config::ElectionConfig;
pub use coordinator::{ElectionCoordinator, ElectionState, ResumptionPoint};
pub use driver::{ElectionDriver, ElectionMessage, ElectionOutcome, ElectionTransport};
pub use enrollment::{Enrollment, wins};
pub use error::{Error, Result};
pub use round::ElectionRound;
pub use weights::{ConstantWeight, RandomWeight, WatermarkWeight, WeightGenerator, Weights};
