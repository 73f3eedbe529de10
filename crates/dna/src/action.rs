//! Tagged actions recorded in DNA

use tessera_identity::ObjectId;

use crate::value::DnaValue;

/// One recorded change to an object.
#[derive(Debug, Clone, PartialEq)]
pub enum DnaAction {
    /// Field assignment
    Physical {
        /// Field name
        field: String,
        /// New value
        value: DnaValue,
        /// Whether `value` names an object the receiver must resolve
        can_be_referenced: bool,
    },
    /// Method invocation replayed in order on the receiver
    Logical {
        /// Method identifier
        method: u32,
        /// Invocation parameters
        params: Vec<DnaValue>,
    },
    /// Single array slot write
    ArrayElement {
        /// Slot index
        index: u32,
        /// New value
        value: DnaValue,
    },
    /// Contiguous array range write
    SubArray {
        /// First slot written
        start: u32,
        /// Values written from `start`
        values: Vec<DnaValue>,
    },
    /// Replacement of the whole array contents
    EntireArray(Vec<DnaValue>),
    /// State of a literal-valued object
    Literal(DnaValue),
    /// Class loader description for a field
    ClassLoader {
        /// Field name
        field: String,
        /// Loader description
        value: String,
    },
}

impl DnaAction {
    /// Object referenced by this action that the receiver must resolve.
    ///
    /// Only physical actions flagged `can_be_referenced` contribute.
    #[must_use]
    pub const fn referenced_object(&self) -> Option<ObjectId> {
        match self {
            Self::Physical {
                value,
                can_be_referenced: true,
                ..
            } => value.as_object_ref(),
            _ => None,
        }
    }
}
