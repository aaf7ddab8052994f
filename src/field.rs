use std::{
    cmp::Ordering,
    fmt,
    io::Read,
};

use crate::{
    error::SmallError,
    io::{Decodeable, Encodeable, SmallWriter},
};

/// A fixed-length string field is padded/truncated to this many bytes on
/// the wire (spec §3: "fixed-length (128-byte padded) string").
pub const STRING_FIELD_LEN: usize = 128;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Type {
    Int,
    Str,
}

impl Type {
    /// Width, in bytes, of a field of this type on the wire.
    pub fn len(&self) -> usize {
        match self {
            Type::Int => 4,
            // 4-byte big-endian length prefix + padded payload.
            Type::Str => 4 + STRING_FIELD_LEN,
        }
    }
}

pub fn get_type_length(t: Type) -> usize {
    t.len()
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct FieldItem {
    pub field_type: Type,
    pub field_name: String,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct IntField {
    pub value: i32,
}

impl IntField {
    pub fn new(v: i32) -> Self {
        Self { value: v }
    }
}

impl fmt::Display for IntField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Encodeable for IntField {
    fn encode(&self, writer: &mut SmallWriter) {
        writer.write(&self.value);
    }
}

impl Decodeable for IntField {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SmallError> {
        Ok(Self::new(i32::decode(reader)?))
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct StringField {
    pub value: String,
}

impl StringField {
    pub fn new(v: &str) -> Self {
        let truncated: String = v.chars().take(STRING_FIELD_LEN).collect();
        Self { value: truncated }
    }
}

impl fmt::Display for StringField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Encodeable for StringField {
    fn encode(&self, writer: &mut SmallWriter) {
        let bytes = self.value.as_bytes();
        let len = bytes.len().min(STRING_FIELD_LEN) as u32;
        writer.write(&len);
        let mut padded = vec![0u8; STRING_FIELD_LEN];
        padded[..len as usize].copy_from_slice(&bytes[..len as usize]);
        writer.write_bytes(&padded);
    }
}

impl Decodeable for StringField {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SmallError> {
        let len = u32::decode(reader)? as usize;
        let mut buf = [0u8; STRING_FIELD_LEN];
        reader.read_exact(&mut buf)?;
        let len = len.min(STRING_FIELD_LEN);
        let value = String::from_utf8_lossy(&buf[..len]).to_string();
        Ok(Self { value })
    }
}

/// A single cell value: either a signed 32-bit integer or a fixed-length
/// string. Ordering between mismatched variants is a schema-level logic
/// error, not a value-level question — it panics rather than returning a
/// bogus `Ordering`, since a well-typed `Tuple` should never compare
/// fields across types.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum Field {
    Int(IntField),
    Str(StringField),
}

impl Field {
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::Str(_) => Type::Str,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Str(v) => write!(f, "{}", v),
        }
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => a.partial_cmp(b),
            (Field::Str(a), Field::Str(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .expect("cannot order fields of different types")
    }
}

impl Encodeable for Field {
    fn encode(&self, writer: &mut SmallWriter) {
        match self {
            Field::Int(v) => v.encode(writer),
            Field::Str(v) => v.encode(writer),
        }
    }
}

impl Field {
    pub fn decode<R: Read>(reader: &mut R, t: Type) -> Result<Self, SmallError> {
        Ok(match t {
            Type::Int => Field::Int(IntField::decode(reader)?),
            Type::Str => Field::Str(StringField::decode(reader)?),
        })
    }
}
