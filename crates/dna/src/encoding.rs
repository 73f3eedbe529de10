//! Binary wire format for DNA records
//!
//! Format (big-endian):
//! ```text
//! [magic: u16 = 0x444E]
//! [protocol: u8]
//! [flags: u8]            bit 0 delta, bit 1 parent present, bit 2 array length present
//! [object_id: u64]
//! [version: u64]
//! [parent_id: u64]       if flag bit 1
//! [array_length: u32]    if flag bit 2
//! [type_name: str]
//! [section_count: u16]
//! For each section:
//!   [action_count: u32]
//!   For each action:
//!     [tag: u8][body]
//! ```
//! Strings are `[len: u32][utf8 bytes]`; values are `[type: u8][body]`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tessera_identity::ObjectId;

use crate::action::DnaAction;
use crate::dna::DnaHeader;
use crate::error::{Error, Result};
use crate::value::DnaValue;

/// Leading two bytes of every record ("DN")
pub const MAGIC: u16 = 0x444E;

/// Wire protocol version written into every record
pub const PROTOCOL_VERSION: u8 = 1;

/// Deepest nesting of array values accepted on either side of the wire
pub const MAX_VALUE_DEPTH: usize = 64;

const FLAG_DELTA: u8 = 1;
const FLAG_PARENT: u8 = 1 << 1;
const FLAG_ARRAY_LENGTH: u8 = 1 << 2;

mod action_tag {
    pub const LOGICAL: u8 = 1;
    pub const PHYSICAL: u8 = 2;
    pub const ARRAY_ELEMENT: u8 = 3;
    pub const ENTIRE_ARRAY: u8 = 4;
    pub const LITERAL: u8 = 5;
    pub const PHYSICAL_REF: u8 = 6;
    pub const SUB_ARRAY: u8 = 7;
    pub const CLASS_LOADER: u8 = 8;
}

mod value_tag {
    pub const NULL: u8 = 0;
    pub const REFERENCE: u8 = 1;
    pub const BOOLEAN: u8 = 2;
    pub const BYTE: u8 = 3;
    pub const CHAR: u8 = 4;
    pub const DOUBLE: u8 = 5;
    pub const FLOAT: u8 = 6;
    pub const INT: u8 = 7;
    pub const LONG: u8 = 10;
    pub const SHORT: u8 = 11;
    pub const STRING: u8 = 12;
    pub const BYTES: u8 = 13;
    pub const ARRAY: u8 = 14;
    pub const CLASS_NAME: u8 = 15;
    pub const ENUM: u8 = 22;
}

/// Serialize a sealed header and its sections
pub fn encode_dna(header: &DnaHeader, sections: &[Vec<DnaAction>]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64);

    buf.put_u16(MAGIC);
    buf.put_u8(PROTOCOL_VERSION);

    let mut flags = 0;
    if header.is_delta {
        flags |= FLAG_DELTA;
    }
    if header.parent.is_some() {
        flags |= FLAG_PARENT;
    }
    if header.array_length.is_some() {
        flags |= FLAG_ARRAY_LENGTH;
    }
    buf.put_u8(flags);

    buf.put_u64(header.object_id.to_raw());
    buf.put_u64(header.version);
    if let Some(parent) = header.parent {
        buf.put_u64(parent.to_raw());
    }
    if let Some(len) = header.array_length {
        buf.put_u32(len);
    }
    put_str(&mut buf, &header.type_name)?;

    let section_count = u16::try_from(sections.len()).map_err(|_| Error::TooLarge {
        what: "section count",
        len: sections.len(),
    })?;
    buf.put_u16(section_count);
    for section in sections {
        put_len(&mut buf, section.len(), "action count")?;
        for action in section {
            encode_action(&mut buf, action)?;
        }
    }

    Ok(buf.freeze())
}

/// Parse one complete record. Trailing bytes are an error.
pub fn decode_dna(mut buf: &[u8]) -> Result<(DnaHeader, Vec<Vec<DnaAction>>)> {
    ensure(buf, 4, "header")?;
    let magic = buf.get_u16();
    if magic != MAGIC {
        return Err(Error::BadMagic(magic));
    }
    let protocol = buf.get_u8();
    if protocol != PROTOCOL_VERSION {
        return Err(Error::UnsupportedVersion(protocol));
    }
    let flags = buf.get_u8();

    ensure(buf, 16, "header")?;
    let object_id = ObjectId::from_raw(buf.get_u64());
    let version = buf.get_u64();
    let parent = if flags & FLAG_PARENT == 0 {
        None
    } else {
        ensure(buf, 8, "parent id")?;
        Some(ObjectId::from_raw(buf.get_u64()))
    };
    let array_length = if flags & FLAG_ARRAY_LENGTH == 0 {
        None
    } else {
        ensure(buf, 4, "array length")?;
        Some(buf.get_u32())
    };
    let type_name = get_str(&mut buf, "type name")?;

    ensure(buf, 2, "section count")?;
    let section_count = buf.get_u16();
    let mut sections = Vec::with_capacity(usize::from(section_count));
    for _ in 0..section_count {
        ensure(buf, 4, "action count")?;
        let count = buf.get_u32();
        let mut actions = Vec::new();
        for _ in 0..count {
            actions.push(decode_action(&mut buf)?);
        }
        sections.push(actions);
    }

    if buf.has_remaining() {
        return Err(Error::TrailingBytes(buf.remaining()));
    }

    let header = DnaHeader {
        object_id,
        type_name,
        parent,
        array_length,
        version,
        is_delta: flags & FLAG_DELTA != 0,
    };
    Ok((header, sections))
}

fn encode_action(buf: &mut BytesMut, action: &DnaAction) -> Result<()> {
    match action {
        DnaAction::Physical {
            field,
            value,
            can_be_referenced,
        } => {
            buf.put_u8(if *can_be_referenced {
                action_tag::PHYSICAL_REF
            } else {
                action_tag::PHYSICAL
            });
            put_str(buf, field)?;
            encode_value(buf, value, 0)
        }
        DnaAction::Logical { method, params } => {
            buf.put_u8(action_tag::LOGICAL);
            buf.put_u32(*method);
            put_values(buf, params, 0)
        }
        DnaAction::ArrayElement { index, value } => {
            buf.put_u8(action_tag::ARRAY_ELEMENT);
            buf.put_u32(*index);
            encode_value(buf, value, 0)
        }
        DnaAction::SubArray { start, values } => {
            buf.put_u8(action_tag::SUB_ARRAY);
            buf.put_u32(*start);
            put_values(buf, values, 0)
        }
        DnaAction::EntireArray(values) => {
            buf.put_u8(action_tag::ENTIRE_ARRAY);
            put_values(buf, values, 0)
        }
        DnaAction::Literal(value) => {
            buf.put_u8(action_tag::LITERAL);
            encode_value(buf, value, 0)
        }
        DnaAction::ClassLoader { field, value } => {
            buf.put_u8(action_tag::CLASS_LOADER);
            put_str(buf, field)?;
            put_str(buf, value)
        }
    }
}

fn decode_action(buf: &mut &[u8]) -> Result<DnaAction> {
    ensure(buf, 1, "action tag")?;
    let tag = buf.get_u8();
    let action = match tag {
        action_tag::PHYSICAL | action_tag::PHYSICAL_REF => DnaAction::Physical {
            field: get_str(buf, "field name")?,
            value: decode_value(buf, 0)?,
            can_be_referenced: tag == action_tag::PHYSICAL_REF,
        },
        action_tag::LOGICAL => {
            ensure(buf, 4, "method id")?;
            let method = buf.get_u32();
            DnaAction::Logical {
                method,
                params: get_values(buf, 0)?,
            }
        }
        action_tag::ARRAY_ELEMENT => {
            ensure(buf, 4, "array index")?;
            let index = buf.get_u32();
            DnaAction::ArrayElement {
                index,
                value: decode_value(buf, 0)?,
            }
        }
        action_tag::SUB_ARRAY => {
            ensure(buf, 4, "sub-array start")?;
            let start = buf.get_u32();
            DnaAction::SubArray {
                start,
                values: get_values(buf, 0)?,
            }
        }
        action_tag::ENTIRE_ARRAY => DnaAction::EntireArray(get_values(buf, 0)?),
        action_tag::LITERAL => DnaAction::Literal(decode_value(buf, 0)?),
        action_tag::CLASS_LOADER => DnaAction::ClassLoader {
            field: get_str(buf, "field name")?,
            value: get_str(buf, "class loader")?,
        },
        other => return Err(Error::UnknownActionTag(other)),
    };
    Ok(action)
}

fn encode_value(buf: &mut BytesMut, value: &DnaValue, depth: usize) -> Result<()> {
    match value {
        DnaValue::Null => buf.put_u8(value_tag::NULL),
        DnaValue::Bool(v) => {
            buf.put_u8(value_tag::BOOLEAN);
            buf.put_u8(u8::from(*v));
        }
        DnaValue::Byte(v) => {
            buf.put_u8(value_tag::BYTE);
            buf.put_i8(*v);
        }
        DnaValue::Char(v) => {
            buf.put_u8(value_tag::CHAR);
            buf.put_u32(u32::from(*v));
        }
        DnaValue::Short(v) => {
            buf.put_u8(value_tag::SHORT);
            buf.put_i16(*v);
        }
        DnaValue::Int(v) => {
            buf.put_u8(value_tag::INT);
            buf.put_i32(*v);
        }
        DnaValue::Long(v) => {
            buf.put_u8(value_tag::LONG);
            buf.put_i64(*v);
        }
        DnaValue::Float(v) => {
            buf.put_u8(value_tag::FLOAT);
            buf.put_f32(*v);
        }
        DnaValue::Double(v) => {
            buf.put_u8(value_tag::DOUBLE);
            buf.put_f64(*v);
        }
        DnaValue::String(v) => {
            buf.put_u8(value_tag::STRING);
            put_str(buf, v)?;
        }
        DnaValue::Bytes(v) => {
            buf.put_u8(value_tag::BYTES);
            put_len(buf, v.len(), "byte array")?;
            buf.put_slice(v);
        }
        DnaValue::ObjectRef(id) => {
            buf.put_u8(value_tag::REFERENCE);
            buf.put_u64(id.to_raw());
        }
        DnaValue::Array(values) => {
            buf.put_u8(value_tag::ARRAY);
            put_values(buf, values, nested(depth)?)?;
        }
        DnaValue::ClassName(v) => {
            buf.put_u8(value_tag::CLASS_NAME);
            put_str(buf, v)?;
        }
        DnaValue::Enum { type_name, name } => {
            buf.put_u8(value_tag::ENUM);
            put_str(buf, type_name)?;
            put_str(buf, name)?;
        }
    }
    Ok(())
}

fn decode_value(buf: &mut &[u8], depth: usize) -> Result<DnaValue> {
    ensure(buf, 1, "value type")?;
    let value = match buf.get_u8() {
        value_tag::NULL => DnaValue::Null,
        value_tag::BOOLEAN => {
            ensure(buf, 1, "boolean")?;
            DnaValue::Bool(buf.get_u8() != 0)
        }
        value_tag::BYTE => {
            ensure(buf, 1, "byte")?;
            DnaValue::Byte(buf.get_i8())
        }
        value_tag::CHAR => {
            ensure(buf, 4, "char")?;
            let raw = buf.get_u32();
            DnaValue::Char(char::from_u32(raw).ok_or(Error::InvalidChar(raw))?)
        }
        value_tag::SHORT => {
            ensure(buf, 2, "short")?;
            DnaValue::Short(buf.get_i16())
        }
        value_tag::INT => {
            ensure(buf, 4, "int")?;
            DnaValue::Int(buf.get_i32())
        }
        value_tag::LONG => {
            ensure(buf, 8, "long")?;
            DnaValue::Long(buf.get_i64())
        }
        value_tag::FLOAT => {
            ensure(buf, 4, "float")?;
            DnaValue::Float(buf.get_f32())
        }
        value_tag::DOUBLE => {
            ensure(buf, 8, "double")?;
            DnaValue::Double(buf.get_f64())
        }
        value_tag::STRING => DnaValue::String(get_str(buf, "string value")?),
        value_tag::BYTES => {
            ensure(buf, 4, "byte array length")?;
            let len = buf.get_u32() as usize;
            ensure(buf, len, "byte array")?;
            DnaValue::Bytes(buf.copy_to_bytes(len).to_vec())
        }
        value_tag::REFERENCE => {
            ensure(buf, 8, "object reference")?;
            DnaValue::ObjectRef(ObjectId::from_raw(buf.get_u64()))
        }
        value_tag::ARRAY => DnaValue::Array(get_values(buf, nested(depth)?)?),
        value_tag::CLASS_NAME => DnaValue::ClassName(get_str(buf, "class name")?),
        value_tag::ENUM => DnaValue::Enum {
            type_name: get_str(buf, "enum type")?,
            name: get_str(buf, "enum constant")?,
        },
        other => return Err(Error::UnknownValueTag(other)),
    };
    Ok(value)
}

fn nested(depth: usize) -> Result<usize> {
    if depth >= MAX_VALUE_DEPTH {
        return Err(Error::Malformed("array values nested too deeply"));
    }
    Ok(depth + 1)
}

fn put_values(buf: &mut BytesMut, values: &[DnaValue], depth: usize) -> Result<()> {
    put_len(buf, values.len(), "value count")?;
    for value in values {
        encode_value(buf, value, depth)?;
    }
    Ok(())
}

fn get_values(buf: &mut &[u8], depth: usize) -> Result<Vec<DnaValue>> {
    ensure(buf, 4, "value count")?;
    let count = buf.get_u32();
    let mut values = Vec::new();
    for _ in 0..count {
        values.push(decode_value(buf, depth)?);
    }
    Ok(values)
}

fn put_str(buf: &mut BytesMut, s: &str) -> Result<()> {
    put_len(buf, s.len(), "string")?;
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_str(buf: &mut &[u8], what: &'static str) -> Result<String> {
    ensure(buf, 4, what)?;
    let len = buf.get_u32() as usize;
    ensure(buf, len, what)?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8(what))
}

fn put_len(buf: &mut BytesMut, len: usize, what: &'static str) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| Error::TooLarge { what, len })?;
    buf.put_u32(len);
    Ok(())
}

fn ensure(buf: &[u8], needed: usize, what: &'static str) -> Result<()> {
    if buf.len() < needed {
        Err(Error::Truncated(what))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tessera_identity::GroupId;

    fn header() -> DnaHeader {
        DnaHeader {
            object_id: ObjectId::encode(42, GroupId::new(1)),
            type_name: "Account".to_string(),
            parent: None,
            array_length: None,
            version: 7,
            is_delta: true,
        }
    }

    #[test]
    fn test_values_survive_the_wire() {
        let values = vec![
            DnaValue::Null,
            DnaValue::Bool(true),
            DnaValue::Byte(-3),
            DnaValue::Char('λ'),
            DnaValue::Short(-300),
            DnaValue::Int(i32::MIN),
            DnaValue::Long(i64::MAX),
            DnaValue::Float(1.5),
            DnaValue::Double(-0.25),
            DnaValue::String("héllo".to_string()),
            DnaValue::Bytes(vec![0, 255, 7]),
            DnaValue::ObjectRef(ObjectId::encode(9, GroupId::new(0))),
            DnaValue::Array(vec![DnaValue::Int(1), DnaValue::Array(vec![])]),
            DnaValue::ClassName("java.util.Map".to_string()),
            DnaValue::Enum {
                type_name: "Color".to_string(),
                name: "RED".to_string(),
            },
        ];
        let sections = vec![vec![DnaAction::EntireArray(values)]];

        let bytes = encode_dna(&header(), &sections).unwrap();
        let (decoded_header, decoded) = decode_dna(&bytes).unwrap();
        assert_eq!(decoded_header, header());
        assert_eq!(decoded, sections);
    }

    #[test]
    fn test_header_flags() {
        let mut full = header();
        full.is_delta = false;
        full.parent = Some(ObjectId::encode(1, GroupId::new(2)));
        full.array_length = Some(16);

        let bytes = encode_dna(&full, &[]).unwrap();
        assert_eq!(&bytes[..2], &[0x44, 0x4E]);
        assert_eq!(bytes[2], PROTOCOL_VERSION);
        assert_eq!(bytes[3], FLAG_PARENT | FLAG_ARRAY_LENGTH);

        let (decoded, sections) = decode_dna(&bytes).unwrap();
        assert_eq!(decoded, full);
        assert!(sections.is_empty());
    }

    #[test]
    fn test_truncated_input() {
        let sections = vec![vec![DnaAction::Physical {
            field: "balance".to_string(),
            value: DnaValue::Long(100),
            can_be_referenced: false,
        }]];
        let bytes = encode_dna(&header(), &sections).unwrap();

        for cut in [0, 3, 10, bytes.len() - 1] {
            assert_matches!(decode_dna(&bytes[..cut]), Err(Error::Truncated(_)));
        }
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let mut bytes = encode_dna(&header(), &[]).unwrap().to_vec();

        bytes[2] = 9;
        assert_eq!(decode_dna(&bytes), Err(Error::UnsupportedVersion(9)));

        bytes[0] = 0;
        assert_eq!(decode_dna(&bytes), Err(Error::BadMagic(0x004E)));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode_dna(&header(), &[]).unwrap().to_vec();
        bytes.extend_from_slice(&[1, 2]);
        assert_eq!(decode_dna(&bytes), Err(Error::TrailingBytes(2)));
    }

    fn nest(depth: usize) -> DnaValue {
        (0..depth).fold(DnaValue::Null, |inner, _| DnaValue::Array(vec![inner]))
    }

    #[test]
    fn test_nesting_limit() {
        let deepest = vec![vec![DnaAction::Literal(nest(MAX_VALUE_DEPTH))]];
        let bytes = encode_dna(&header(), &deepest).unwrap();
        assert_eq!(decode_dna(&bytes).unwrap().1, deepest);

        let too_deep = vec![vec![DnaAction::Literal(nest(MAX_VALUE_DEPTH + 1))]];
        assert_matches!(encode_dna(&header(), &too_deep), Err(Error::Malformed(_)));
    }

    #[test]
    fn test_hostile_nesting_rejected_without_recursing() {
        let mut bytes = encode_dna(&header(), &[vec![DnaAction::Literal(DnaValue::Null)]])
            .unwrap()
            .to_vec();
        bytes.pop();
        for _ in 0..100_000 {
            bytes.push(value_tag::ARRAY);
            bytes.extend_from_slice(&1u32.to_be_bytes());
        }
        bytes.push(value_tag::NULL);

        assert_matches!(decode_dna(&bytes), Err(Error::Malformed(_)));
    }

    #[test]
    fn test_section_count_overflow_is_an_error() {
        let sections = vec![Vec::new(); usize::from(u16::MAX) + 1];
        assert_eq!(
            encode_dna(&header(), &sections),
            Err(Error::TooLarge {
                what: "section count",
                len: 65536
            })
        );
    }

    #[test]
    fn test_rejects_unknown_tags() {
        let mut bytes = encode_dna(&header(), &[vec![DnaAction::Literal(DnaValue::Null)]])
            .unwrap()
            .to_vec();
        let last = bytes.len() - 1;

        bytes[last] = 99;
        assert_eq!(decode_dna(&bytes), Err(Error::UnknownValueTag(99)));

        bytes[last - 1] = 42;
        assert_eq!(decode_dna(&bytes), Err(Error::UnknownActionTag(42)));
    }
}
