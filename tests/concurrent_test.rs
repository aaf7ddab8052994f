use std::sync::{Arc, Barrier};

use small_db::{database::Database, page_id::PageId, transaction::Transaction};

mod common;

/// Scenario 5 (NO-STEAL): an uncommitted insert is invisible to a
/// concurrent scan and leaves no trace on disk once aborted.
#[test]
fn aborted_insert_is_invisible_and_leaves_disk_untouched() {
    common::setup();

    let (table, table_id) = common::create_empty_heap_table(1);

    let setup_tx = Transaction::new();
    table.read().unwrap().insert_tuple(&setup_tx, &common::int_tuple(&[1])).unwrap();
    setup_tx.commit().unwrap();

    let page0 = PageId::new(table_id, 0);
    let before = table.read().unwrap().read_page_bytes(&page0).unwrap();

    let t1 = Transaction::new();
    table.read().unwrap().insert_tuple(&t1, &common::int_tuple(&[2])).unwrap();
    t1.abort().unwrap();

    let after = table.read().unwrap().read_page_bytes(&page0).unwrap();
    assert_eq!(before, after, "aborted transaction must not steal its dirty page to disk");

    let t2 = Transaction::new();
    let rows: Vec<i32> = table
        .read()
        .unwrap()
        .iterator(&t2)
        .unwrap()
        .map(|t| int_value(&t, 0))
        .collect();
    t2.commit().unwrap();

    assert_eq!(rows, vec![1], "a concurrent reader must never observe an aborted transaction's writes");
}

/// Scenario 6: a transaction that cannot acquire a conflicting lock
/// within the deadlock timeout is aborted, and the lock holder is left
/// completely unaffected.
#[test]
fn conflicting_writer_times_out_without_disturbing_holder() {
    common::setup();

    let (table, table_id) = common::create_empty_heap_table(1);
    let setup_tx = Transaction::new();
    table.read().unwrap().insert_tuple(&setup_tx, &common::int_tuple(&[1])).unwrap();
    setup_tx.commit().unwrap();

    let page0 = PageId::new(table_id, 0);
    let t1 = Transaction::new();

    let barrier = Arc::new(Barrier::new(2));
    let barrier2 = barrier.clone();

    let holder = std::thread::spawn(move || {
        Database::buffer_pool()
            .get_heap_page(&t1, small_db::concurrent_status::Permission::ReadWrite, &page0)
            .unwrap();
        barrier2.wait();
        std::thread::sleep(small_db::config::DEADLOCK_TIMEOUT + std::time::Duration::from_secs(1));
        t1.commit().unwrap();
    });

    barrier.wait();
    let t2 = Transaction::new();
    let result = Database::buffer_pool().get_heap_page(
        &t2,
        small_db::concurrent_status::Permission::ReadWrite,
        &page0,
    );
    assert!(result.is_err(), "a conflicting writer must time out rather than block forever");

    holder.join().unwrap();

    let t3 = Transaction::new();
    let rows: Vec<i32> = table
        .read()
        .unwrap()
        .iterator(&t3)
        .unwrap()
        .map(|t| int_value(&t, 0))
        .collect();
    t3.commit().unwrap();
    assert_eq!(rows, vec![1], "the original lock holder's eventual commit must still succeed");
}

fn int_value(t: &small_db::tuple::Tuple, i: usize) -> i32 {
    match t.get_field(i) {
        small_db::field::Field::Int(v) => v.value,
        small_db::field::Field::Str(_) => panic!("expected int field"),
    }
}
