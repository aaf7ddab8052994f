use std::{fmt, io::Read, sync::Arc};

use itertools::Itertools;

use crate::{
    btree::page_id::BTreePageID,
    error::SmallError,
    field::{get_type_length, Field, FieldItem, Type},
    io::{Encodeable, SmallWriter},
    page_id::RecordId,
};

/// Ordered sequence of `(Type, optional name)` items describing a row
/// shape. Two descriptors are equal iff their type sequences match —
/// names are cosmetic.
#[derive(Clone, Debug)]
pub struct TupleDesc {
    items: Arc<Vec<FieldItem>>,
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(other.items.iter())
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl TupleDesc {
    pub fn new(types: &[Type], names: &[&str]) -> Self {
        let items = types
            .iter()
            .zip(names.iter())
            .map(|(t, n)| FieldItem {
                field_type: *t,
                field_name: n.to_string(),
            })
            .collect_vec();
        Self {
            items: Arc::new(items),
        }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn get_field_type(&self, i: usize) -> Type {
        self.items[i].field_type
    }

    pub fn get_field_name(&self, i: usize) -> &str {
        &self.items[i].field_name
    }

    pub fn name_to_index(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|i| i.field_name == name)
    }

    /// Total on-disk byte width of a tuple with this shape.
    pub fn get_size(&self) -> usize {
        self.items.iter().map(|i| get_type_length(i.field_type)).sum()
    }
}

/// A fixed-width row: a schema, a field vector of that arity, and an
/// optional record id identifying where it is stored (a weak
/// back-reference — lookup only, never ownership; spec §3).
#[derive(Clone, Debug)]
pub struct Tuple {
    pub scheme: TupleDesc,
    fields: Vec<Field>,
    pub record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(scheme: TupleDesc, fields: Vec<Field>) -> Self {
        assert_eq!(scheme.num_fields(), fields.len());
        Self {
            scheme,
            fields,
            record_id: None,
        }
    }

    /// Decode a tuple's fixed-width bytes according to `scheme`.
    pub fn from_bytes(scheme: &TupleDesc, bytes: &[u8]) -> Result<Self, SmallError> {
        let mut cursor = bytes;
        let mut fields = Vec::with_capacity(scheme.num_fields());
        for i in 0..scheme.num_fields() {
            fields.push(Field::decode(&mut cursor, scheme.get_field_type(i))?);
        }
        Ok(Self::new(scheme.clone(), fields))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = SmallWriter::new();
        for f in &self.fields {
            writer.write(f);
        }
        writer.to_bytes()
    }

    pub fn get_field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn set_field(&mut self, i: usize, field: Field) {
        self.fields[i] = field;
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({})", self.fields.iter().map(|x| x.to_string()).join(", "))
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

/// Decode helper used by B+ tree pages, where a tuple's bytes are read
/// straight off a `&[u8]` slice via a `Read` cursor.
pub fn decode_tuple<R: Read>(reader: &mut R, scheme: &TupleDesc) -> Result<Tuple, SmallError> {
    let mut fields = Vec::with_capacity(scheme.num_fields());
    for i in 0..scheme.num_fields() {
        fields.push(Field::decode(reader, scheme.get_field_type(i))?);
    }
    Ok(Tuple::new(scheme.clone(), fields))
}

/// A tuple plus the B+ tree leaf slot it currently occupies — the B+ tree
/// equivalent of `Tuple::record_id`, kept separate because `BTreePageID`
/// lives in a different module than the heap-file `PageId`.
#[derive(Clone, Debug)]
pub struct WrappedTuple {
    tuple: Tuple,
    slot_number: usize,
    pid: BTreePageID,
}

impl WrappedTuple {
    pub fn new(tuple: Tuple, slot_number: usize, pid: BTreePageID) -> Self {
        Self {
            tuple,
            slot_number,
            pid,
        }
    }

    pub fn get_slot_number(&self) -> usize {
        self.slot_number
    }

    pub fn get_pid(&self) -> BTreePageID {
        self.pid.clone()
    }

    pub fn get_tuple(&self) -> &Tuple {
        &self.tuple
    }
}

impl std::ops::Deref for WrappedTuple {
    type Target = Tuple;
    fn deref(&self) -> &Self::Target {
        &self.tuple
    }
}

impl fmt::Display for WrappedTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tuple)
    }
}
