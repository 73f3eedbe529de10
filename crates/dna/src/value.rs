//! Values carried by DNA actions

use tessera_identity::ObjectId;

/// A literal or reference value recorded in a DNA action.
#[derive(Debug, Clone, PartialEq)]
pub enum DnaValue {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed byte
    Byte(i8),
    /// Character
    Char(char),
    /// 16-bit integer
    Short(i16),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Reference to another managed object
    ObjectRef(ObjectId),
    /// Nested array of values
    Array(Vec<DnaValue>),
    /// Name of a type
    ClassName(String),
    /// Enum constant
    Enum {
        /// Enum type name
        type_name: String,
        /// Constant name
        name: String,
    },
}

impl DnaValue {
    /// Referenced object, if this value is a non-null reference
    #[must_use]
    pub const fn as_object_ref(&self) -> Option<ObjectId> {
        match self {
            Self::ObjectRef(id) if !id.is_null() => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for DnaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for DnaValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for DnaValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for DnaValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for DnaValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DnaValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<ObjectId> for DnaValue {
    fn from(value: ObjectId) -> Self {
        Self::ObjectRef(value)
    }
}
