use small_db::{
    btree::table::{Op, Predicate},
    field::{Field, IntField},
    iterator::DbFileIterator,
    transaction::Transaction,
};

mod common;

/// Range predicates (`GreaterThan`/`LessThanOrEq`/...) against an index
/// return exactly the matching keys, regardless of insertion order.
#[test]
fn range_predicates_match_expected_keys() {
    common::setup();

    let rows = 1500;
    let (table_id, _keys) = common::create_random_btree_table(1, rows);
    let table = small_db::database::Database::catalog().get_btree_table(table_id).unwrap();

    let tx = Transaction::new();

    let bound = 400;
    let greater: Vec<i32> = table
        .read()
        .unwrap()
        .search(&tx, Predicate::new(Op::GreaterThan, Field::Int(IntField::new(bound))))
        .unwrap()
        .map(|t| int_value(t.get_tuple(), 0))
        .collect();
    assert_eq!(greater, ((bound + 1)..rows as i32).collect::<Vec<_>>());

    let less_eq: Vec<i32> = table
        .read()
        .unwrap()
        .search(&tx, Predicate::new(Op::LessThanOrEq, Field::Int(IntField::new(bound))))
        .unwrap()
        .map(|t| int_value(t.get_tuple(), 0))
        .collect();
    assert_eq!(less_eq, (0..=bound).collect::<Vec<_>>());

    let ge_bound = 1200;
    let ge: Vec<i32> = table
        .read()
        .unwrap()
        .search(&tx, Predicate::new(Op::GreaterThanOrEq, Field::Int(IntField::new(ge_bound))))
        .unwrap()
        .map(|t| int_value(t.get_tuple(), 0))
        .collect();
    assert_eq!(ge, (ge_bound..rows as i32).collect::<Vec<_>>());

    tx.commit().unwrap();
}

/// A point lookup for a key that was never inserted returns no rows,
/// rather than panicking or returning a neighbor.
#[test]
fn missing_key_returns_empty() {
    common::setup();

    let rows = 200;
    let (table_id, _keys) = common::create_random_btree_table(1, rows);
    let table = small_db::database::Database::catalog().get_btree_table(table_id).unwrap();

    let tx = Transaction::new();
    let matches: Vec<i32> = table
        .read()
        .unwrap()
        .search(&tx, Predicate::new(Op::Equals, Field::Int(IntField::new(rows as i32 + 50))))
        .unwrap()
        .map(|t| int_value(t.get_tuple(), 0))
        .collect();
    assert!(matches.is_empty());
    tx.commit().unwrap();
}

/// `restartable_search`'s `rewind` re-descends the tree rather than
/// replaying a cached leaf: a row inserted after the first `open()` but
/// before `rewind()` is visible on the second pass.
#[test]
fn restartable_search_rewind_sees_later_inserts() {
    common::setup();

    let (table, table_id) = common::create_empty_btree_table(1);
    let tx = Transaction::new();
    for k in 0..50 {
        table.read().unwrap().insert_tuple(&tx, &common::int_tuple(&[k])).unwrap();
    }
    tx.commit().unwrap();

    let scan_tx = Transaction::new();
    let table = small_db::database::Database::catalog().get_btree_table(table_id).unwrap();
    let mut it = table
        .read()
        .unwrap()
        .restartable_search(&scan_tx, Predicate::new(Op::GreaterThanOrEq, Field::Int(IntField::new(0))))
        .unwrap();

    it.open().unwrap();
    let mut first_pass = Vec::new();
    while it.has_next().unwrap() {
        first_pass.push(int_value(&it.next().unwrap(), 0));
    }
    assert_eq!(first_pass.len(), 50);

    // Insert under the same transaction the iterator is bound to — a
    // second, concurrent transaction would conflict with the S-locks
    // `first_pass` is still holding on every leaf page it visited.
    table.read().unwrap().insert_tuple(&scan_tx, &common::int_tuple(&[50])).unwrap();

    it.rewind().unwrap();
    let mut second_pass = Vec::new();
    while it.has_next().unwrap() {
        second_pass.push(int_value(&it.next().unwrap(), 0));
    }
    it.close();
    scan_tx.commit().unwrap();

    assert_eq!(second_pass.len(), 51, "rewind must re-descend and observe the row inserted in between");
}

fn int_value(t: &small_db::tuple::Tuple, i: usize) -> i32 {
    match t.get_field(i) {
        small_db::field::Field::Int(v) => v.value,
        small_db::field::Field::Str(_) => panic!("expected int field"),
    }
}
