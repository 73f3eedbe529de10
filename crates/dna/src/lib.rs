//! Delta Network Actions (DNA): the log representation of one object's
//! state change.
//!
//! This crate provides:
//! - `DnaWriter` - single-writer builder that records tagged actions
//! - `Dna` - the sealed, immutable record together with its wire bytes
//! - `DnaCursor` - restartable replay of actions in emission order
//! - `ObjectState` - server-side application of DNA to an object
//! - `merge_sorted` / `DnaHistory` - layering of ordered logs

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod action;
mod cursor;
mod dna;
mod encoding;
mod error;
mod history;
mod state;
mod value;
mod writer;

pub use action::DnaAction;
pub use cursor::DnaCursor;
pub use dna::{Dna, DnaHeader};
pub use encoding::{MAX_VALUE_DEPTH, PROTOCOL_VERSION};
pub use error::{Error, Result};
pub use history::{DnaHistory, MergeOutcome, MergePolicy, merge_sorted};
pub use state::{LogicalInvocation, MAX_ARRAY_LENGTH, ObjectState};
pub use value::DnaValue;
pub use writer::DnaWriter;
