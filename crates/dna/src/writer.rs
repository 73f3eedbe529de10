//! Single-writer DNA builder

use tessera_identity::ObjectId;
use tracing::trace;

use crate::action::DnaAction;
use crate::dna::{Dna, DnaHeader};
use crate::error::Result;
use crate::value::DnaValue;

/// Records the actions of one object change and seals them into a [`Dna`].
///
/// `finalize_dna` consumes the writer, so no action or header change can be
/// made after sealing.
#[derive(Debug)]
pub struct DnaWriter {
    header: DnaHeader,
    sections: Vec<Vec<DnaAction>>,
    current: Vec<DnaAction>,
}

impl DnaWriter {
    /// Start a record for `object_id` producing `version`.
    pub fn new(object_id: ObjectId, type_name: impl Into<String>, version: u64, is_delta: bool) -> Self {
        Self {
            header: DnaHeader {
                object_id,
                type_name: type_name.into(),
                parent: None,
                array_length: None,
                version,
                is_delta,
            },
            sections: Vec::new(),
            current: Vec::new(),
        }
    }

    /// Start a delta record
    pub fn delta(object_id: ObjectId, type_name: impl Into<String>, version: u64) -> Self {
        Self::new(object_id, type_name, version, true)
    }

    /// Start a full-state record
    pub fn full(object_id: ObjectId, type_name: impl Into<String>, version: u64) -> Self {
        Self::new(object_id, type_name, version, false)
    }

    /// Record a field assignment. Object references are flagged for resolution.
    pub fn add_physical_action(&mut self, field: impl Into<String>, value: impl Into<DnaValue>) {
        let value = value.into();
        let can_be_referenced = matches!(value, DnaValue::ObjectRef(_));
        self.add_physical_action_ref(field, value, can_be_referenced);
    }

    /// Record a field assignment with an explicit reference flag.
    pub fn add_physical_action_ref(
        &mut self,
        field: impl Into<String>,
        value: impl Into<DnaValue>,
        can_be_referenced: bool,
    ) {
        self.push(DnaAction::Physical {
            field: field.into(),
            value: value.into(),
            can_be_referenced,
        });
    }

    /// Record a method invocation.
    pub fn add_logical_action(&mut self, method: u32, params: Vec<DnaValue>) {
        self.push(DnaAction::Logical { method, params });
    }

    /// Record a single array slot write.
    pub fn add_array_element_action(&mut self, index: u32, value: impl Into<DnaValue>) {
        self.push(DnaAction::ArrayElement {
            index,
            value: value.into(),
        });
    }

    /// Record a write of `array[..length]` (the whole slice when `None`)
    /// starting at slot `start`.
    ///
    /// # Panics
    ///
    /// Panics if `length` exceeds the slice length.
    pub fn add_sub_array_action(&mut self, start: u32, array: &[DnaValue], length: Option<usize>) {
        let length = length.unwrap_or(array.len());
        assert!(
            length <= array.len(),
            "sub-array length {length} exceeds source length {}",
            array.len()
        );
        self.push(DnaAction::SubArray {
            start,
            values: array[..length].to_vec(),
        });
    }

    /// Record a replacement of the whole array.
    pub fn add_entire_array(&mut self, values: Vec<DnaValue>) {
        self.push(DnaAction::EntireArray(values));
    }

    /// Record the value of a literal object.
    pub fn add_literal_value(&mut self, value: impl Into<DnaValue>) {
        self.push(DnaAction::Literal(value.into()));
    }

    /// Record a class loader description for a field.
    pub fn add_class_loader_action(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.push(DnaAction::ClassLoader {
            field: field.into(),
            value: value.into(),
        });
    }

    /// Annotate the enclosing object.
    pub fn set_parent_object_id(&mut self, parent: ObjectId) {
        self.header.parent = Some(parent);
    }

    /// Annotate the array length.
    pub fn set_array_length(&mut self, length: u32) {
        self.header.array_length = Some(length);
    }

    /// Close the current section. No-op when nothing was recorded since the
    /// last boundary.
    pub fn mark_section_end(&mut self) {
        if !self.current.is_empty() {
            self.sections.push(std::mem::take(&mut self.current));
        }
    }

    /// Number of actions recorded so far
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.sections.iter().map(Vec::len).sum::<usize>() + self.current.len()
    }

    /// Seal the record.
    ///
    /// # Errors
    ///
    /// Fails when the record does not fit the wire format: too many
    /// sections, an oversized string or array, or values nested deeper than
    /// the decoder accepts.
    pub fn finalize_dna(mut self) -> Result<Dna> {
        self.mark_section_end();
        trace!(
            "Sealed DNA for {} v{}: {} sections",
            self.header.object_id,
            self.header.version,
            self.sections.len()
        );
        Dna::from_parts(self.header, self.sections)
    }

    fn push(&mut self, action: DnaAction) {
        self.current.push(action);
    }
}
