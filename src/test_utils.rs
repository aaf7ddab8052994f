//! Crate-internal fixtures shared by the `#[cfg(test)]` unit-test modules
//! scattered through `src/`. Not part of the public API: integration
//! tests under `tests/` link the library built without `cfg(test)` and
//! reach for `tests/common/mod.rs` instead.
#![cfg(test)]

use crate::{
    field::{Field, IntField, Type},
    transaction::Transaction,
    tuple::{Tuple, TupleDesc},
};

pub fn int_tuple_desc(columns: usize) -> TupleDesc {
    let types = vec![Type::Int; columns];
    let names: Vec<&str> = (0..columns).map(|_| "").collect();
    TupleDesc::new(&types, &names)
}

pub fn int_tuple(values: &[i32]) -> Tuple {
    let desc = int_tuple_desc(values.len());
    let fields = values.iter().map(|v| Field::Int(IntField::new(*v))).collect();
    Tuple::new(desc, fields)
}

/// A transaction with a fixed, caller-chosen id, for tests that need to
/// compare two `Transaction` values or reason about a specific id rather
/// than whatever the process-wide counter happens to produce next.
pub fn fixed_transaction(id: u64) -> Transaction {
    Transaction::new_specific_id(id)
}
