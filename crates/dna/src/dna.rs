//! Sealed DNA records

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use tessera_identity::ObjectId;

use crate::action::DnaAction;
use crate::cursor::DnaCursor;
use crate::encoding;
use crate::error::Result;

/// Metadata describing the object a record applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnaHeader {
    /// Target object
    pub object_id: ObjectId,
    /// Type name of the target object
    pub type_name: String,
    /// Enclosing object, for objects nested in another
    pub parent: Option<ObjectId>,
    /// Array length, for array objects
    pub array_length: Option<u32>,
    /// Object version this record produces
    pub version: u64,
    /// Delta (changes only) or full state
    pub is_delta: bool,
}

/// An immutable, sealed DNA record.
///
/// The encoded bytes are kept alongside the parsed actions so the record can
/// be forwarded without re-encoding. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Dna {
    header: Arc<DnaHeader>,
    actions: Arc<[DnaAction]>,
    section_ends: Arc<[usize]>,
    encoded: Bytes,
}

impl Dna {
    pub(crate) fn from_parts(header: DnaHeader, sections: Vec<Vec<DnaAction>>) -> Result<Self> {
        let encoded = encoding::encode_dna(&header, &sections)?;
        Ok(Self::assemble(header, sections, encoded))
    }

    fn assemble(header: DnaHeader, sections: Vec<Vec<DnaAction>>, encoded: Bytes) -> Self {
        let mut section_ends = Vec::with_capacity(sections.len());
        let mut actions = Vec::new();
        for section in sections {
            actions.extend(section);
            section_ends.push(actions.len());
        }
        Self {
            header: Arc::new(header),
            actions: actions.into(),
            section_ends: section_ends.into(),
            encoded,
        }
    }

    /// Parse a record received off the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not exactly one well-formed record.
    pub fn decode(bytes: Bytes) -> Result<Self> {
        let (header, sections) = encoding::decode_dna(&bytes)?;
        Ok(Self::assemble(header, sections, bytes))
    }

    /// Header metadata
    #[must_use]
    pub fn header(&self) -> &DnaHeader {
        &self.header
    }

    /// Target object
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.header.object_id
    }

    /// Object version this record produces
    #[must_use]
    pub fn version(&self) -> u64 {
        self.header.version
    }

    /// Whether this record carries changes only
    #[must_use]
    pub fn is_delta(&self) -> bool {
        self.header.is_delta
    }

    /// All actions in emission order
    #[must_use]
    pub fn actions(&self) -> &[DnaAction] {
        &self.actions
    }

    /// Number of actions
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Number of sealed sections
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.section_ends.len()
    }

    /// Actions of one section, or `None` past the last section
    #[must_use]
    pub fn section(&self, index: usize) -> Option<&[DnaAction]> {
        let end = *self.section_ends.get(index)?;
        let start = index.checked_sub(1).map_or(0, |prev| self.section_ends[prev]);
        Some(&self.actions[start..end])
    }

    /// Objects named by reference-flagged physical actions
    #[must_use]
    pub fn referenced_objects(&self) -> BTreeSet<ObjectId> {
        self.actions
            .iter()
            .filter_map(DnaAction::referenced_object)
            .collect()
    }

    /// Cursor over the actions, positioned before the first one
    #[must_use]
    pub fn cursor(&self) -> DnaCursor<'_> {
        DnaCursor::new(self)
    }

    /// Wire bytes
    #[must_use]
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }
}

impl PartialEq for Dna {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}
