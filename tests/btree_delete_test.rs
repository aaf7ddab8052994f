use small_db::transaction::Transaction;

mod common;

/// Scenario 4: deleting a contiguous middle range out of a populated
/// tree leaves the rest, still sorted, and never drops below minimum
/// occupancy at any intermediate point (checked after every delete).
#[test]
fn delete_merge_cascade() {
    common::setup();

    let total = 3100;
    let (table, _table_id) = common::create_empty_btree_table(1);

    let insert_tx = Transaction::new();
    let mut keys: Vec<i32> = (0..total).collect();
    use rand::seq::SliceRandom;
    keys.shuffle(&mut rand::thread_rng());
    for k in &keys {
        table.read().unwrap().insert_tuple(&insert_tx, &common::int_tuple(&[*k])).unwrap();
    }
    insert_tx.commit().unwrap();

    let lower = 500;
    let upper = 2500;
    let mut to_delete: Vec<i32> = (lower..upper).collect();
    to_delete.shuffle(&mut rand::thread_rng());

    for k in &to_delete {
        let tx = Transaction::new();
        let wrapped = table
            .read()
            .unwrap()
            .search(
                &tx,
                small_db::btree::table::Predicate::new(
                    small_db::btree::table::Op::Equals,
                    small_db::field::Field::Int(small_db::field::IntField::new(*k)),
                ),
            )
            .unwrap()
            .next()
            .expect("key must still be present before its own deletion");
        table.read().unwrap().delete_tuple(&tx, &wrapped).unwrap();
        table.read().unwrap().check_integrity(&tx, true).unwrap();
        tx.commit().unwrap();
    }

    let tx = Transaction::new();
    let remaining: Vec<i32> = table
        .read()
        .unwrap()
        .iter(&tx)
        .unwrap()
        .map(|t| int_value(t.get_tuple(), 0))
        .collect();
    tx.commit().unwrap();

    let mut expected: Vec<i32> = (0..lower).chain(upper..total).collect();
    expected.sort_unstable();
    assert_eq!(remaining, expected);
    assert_eq!(remaining.len(), (total - (upper - lower)) as usize);
}

fn int_value(t: &small_db::tuple::Tuple, i: usize) -> i32 {
    match t.get_field(i) {
        small_db::field::Field::Int(v) => v.value,
        small_db::field::Field::Str(_) => panic!("expected int field"),
    }
}
