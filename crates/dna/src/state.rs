//! Server-side application of DNA to managed object state

use std::collections::BTreeMap;

use tessera_identity::ObjectId;
use tracing::debug;

use crate::action::DnaAction;
use crate::dna::Dna;
use crate::error::{Error, Result};
use crate::value::DnaValue;

/// Largest array length a record may declare for its object
pub const MAX_ARRAY_LENGTH: u32 = 1 << 24;

/// A replayed method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalInvocation {
    /// Method identifier
    pub method: u32,
    /// Invocation parameters
    pub params: Vec<DnaValue>,
}

/// The server's copy of one managed object, built by applying DNA.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectState {
    object_id: ObjectId,
    type_name: String,
    parent: Option<ObjectId>,
    version: Option<u64>,
    fields: BTreeMap<String, DnaValue>,
    class_loaders: BTreeMap<String, String>,
    invocations: Vec<LogicalInvocation>,
    array: Vec<DnaValue>,
    literal: Option<DnaValue>,
}

impl ObjectState {
    /// Empty state that has not yet seen any DNA
    #[must_use]
    pub const fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            type_name: String::new(),
            parent: None,
            version: None,
            fields: BTreeMap::new(),
            class_loaders: BTreeMap::new(),
            invocations: Vec::new(),
            array: Vec::new(),
            literal: None,
        }
    }

    /// Build state from a full record.
    ///
    /// # Errors
    ///
    /// Fails if `dna` is a delta or its actions do not apply.
    pub fn from_dna(dna: &Dna) -> Result<Self> {
        let mut state = Self::new(dna.object_id());
        state.apply(dna)?;
        Ok(state)
    }

    /// Apply one record.
    ///
    /// Physical writes are last-write-wins in emission order. Logical actions
    /// are appended in emission order without deduplication. A full record
    /// replaces all prior state. The state is unchanged on error.
    ///
    /// # Errors
    ///
    /// Fails if the record targets another object, does not advance the
    /// version, is a delta with no prior full record, declares an array
    /// longer than [`MAX_ARRAY_LENGTH`], or writes outside the array.
    pub fn apply(&mut self, dna: &Dna) -> Result<()> {
        let header = dna.header();
        if header.object_id != self.object_id {
            return Err(Error::ObjectMismatch {
                expected: self.object_id,
                found: header.object_id,
            });
        }
        match self.version {
            Some(current) if header.version <= current => {
                return Err(Error::StaleVersion {
                    current,
                    incoming: header.version,
                });
            }
            None if header.is_delta => return Err(Error::DeltaWithoutBase(self.object_id)),
            _ => {}
        }

        if let Some(length) = header.array_length {
            if length > MAX_ARRAY_LENGTH {
                return Err(Error::ArrayTooLarge {
                    length,
                    max: MAX_ARRAY_LENGTH,
                });
            }
        }

        let mut next = if header.is_delta {
            self.clone()
        } else {
            let mut fresh = Self::new(self.object_id);
            fresh.type_name.clone_from(&header.type_name);
            fresh
        };

        if header.parent.is_some() {
            next.parent = header.parent;
        }
        if let Some(length) = header.array_length {
            next.array.resize(length as usize, DnaValue::Null);
        }

        for action in dna.cursor() {
            next.apply_action(action)?;
        }
        next.version = Some(header.version);

        debug!(
            "Applied {} DNA to {} v{} ({} actions)",
            if header.is_delta { "delta" } else { "full" },
            self.object_id,
            header.version,
            dna.action_count()
        );
        *self = next;
        Ok(())
    }

    fn apply_action(&mut self, action: &DnaAction) -> Result<()> {
        match action {
            DnaAction::Physical { field, value, .. } => {
                self.fields.insert(field.clone(), value.clone());
            }
            DnaAction::Logical { method, params } => {
                self.invocations.push(LogicalInvocation {
                    method: *method,
                    params: params.clone(),
                });
            }
            DnaAction::ArrayElement { index, value } => {
                let len = self.array.len();
                let slot = self
                    .array
                    .get_mut(*index as usize)
                    .ok_or(Error::ArrayIndexOutOfBounds {
                        index: *index as usize,
                        len,
                    })?;
                *slot = value.clone();
            }
            DnaAction::SubArray { start, values } => {
                let start = *start as usize;
                let len = self.array.len();
                let range = self
                    .array
                    .get_mut(start..start + values.len())
                    .ok_or(Error::ArrayIndexOutOfBounds { index: start, len })?;
                range.clone_from_slice(values);
            }
            DnaAction::EntireArray(values) => {
                self.array.clone_from(values);
            }
            DnaAction::Literal(value) => {
                self.literal = Some(value.clone());
            }
            DnaAction::ClassLoader { field, value } => {
                self.class_loaders.insert(field.clone(), value.clone());
            }
        }
        Ok(())
    }

    /// Object this state belongs to
    #[must_use]
    pub const fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Type name from the last full record
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Enclosing object, if any
    #[must_use]
    pub const fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Last applied version, `None` before the first record
    #[must_use]
    pub const fn version(&self) -> Option<u64> {
        self.version
    }

    /// Current value of a field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&DnaValue> {
        self.fields.get(name)
    }

    /// All fields by name
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, DnaValue> {
        &self.fields
    }

    /// Class loader recorded for a field
    #[must_use]
    pub fn class_loader(&self, field: &str) -> Option<&str> {
        self.class_loaders.get(field).map(String::as_str)
    }

    /// Replayed invocations in order
    #[must_use]
    pub fn invocations(&self) -> &[LogicalInvocation] {
        &self.invocations
    }

    /// Array contents
    #[must_use]
    pub fn array(&self) -> &[DnaValue] {
        &self.array
    }

    /// Literal value, if the object is a literal
    #[must_use]
    pub const fn literal(&self) -> Option<&DnaValue> {
        self.literal.as_ref()
    }
}
