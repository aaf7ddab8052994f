use small_db::{
    btree::table::{Op, Predicate},
    field::{Field, IntField},
    transaction::Transaction,
};

mod common;

/// Scenario 3: inserting keys in an arbitrary (here: reverse) order and
/// scanning afterwards yields them sorted by key; an equality search
/// on the index finds exactly one match.
#[test]
fn insert_reverse_order_scans_sorted() {
    common::setup();

    let rows = 2000;
    let (table, _table_id) = common::create_empty_btree_table(1);

    let tx = Transaction::new();
    for k in (0..rows).rev() {
        table.read().unwrap().insert_tuple(&tx, &common::int_tuple(&[k])).unwrap();
    }
    tx.commit().unwrap();

    let check_tx = Transaction::new();
    table.read().unwrap().check_integrity(&check_tx, true).unwrap();

    let scanned: Vec<i32> = table
        .read()
        .unwrap()
        .iter(&check_tx)
        .unwrap()
        .map(|t| int_value(t.get_tuple(), 0))
        .collect();
    assert_eq!(scanned, (0..rows).collect::<Vec<_>>());

    let half = rows / 2;
    let matches: Vec<i32> = table
        .read()
        .unwrap()
        .search(&check_tx, Predicate::new(Op::Equals, Field::Int(IntField::new(half))))
        .unwrap()
        .map(|t| int_value(t.get_tuple(), 0))
        .collect();
    assert_eq!(matches, vec![half]);
    check_tx.commit().unwrap();
}

fn int_value(t: &small_db::tuple::Tuple, i: usize) -> i32 {
    match t.get_field(i) {
        small_db::field::Field::Int(v) => v.value,
        small_db::field::Field::Str(_) => panic!("expected int field"),
    }
}
