use std::sync::{Arc, RwLock};

use rand::prelude::*;
use small_db::{
    btree::table::BTreeTable,
    config::set_page_size,
    database::Database,
    field::{Field, IntField},
    heap::file::HeapFile,
    transaction::Transaction,
    tuple::{Tuple, TupleDesc},
    types::Pod,
};

/// Resets global state shared across tests: the buffer pool cache, the
/// lock table, and the catalog. Every test that touches `Database`
/// should call this first — tests run concurrently in one process and
/// the singleton would otherwise leak state between them.
pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    set_page_size(4096);
    Database::mut_buffer_pool().flush_all_pages().unwrap();
    Database::concurrent_status().clear();
    *Database::mut_catalog() = small_db::catalog::Catalog::new();
}

/// A path inside a fresh temp directory, leaked for the test's lifetime
/// so the backing file survives until the process exits.
pub fn new_temp_path() -> String {
    let dir = tempfile::tempdir().unwrap().into_path();
    dir.join("table.db").to_string_lossy().to_string()
}

pub fn int_tuple_desc(columns: usize) -> TupleDesc {
    let types = vec![small_db::field::Type::Int; columns];
    let names: Vec<&str> = (0..columns).map(|_| "").collect();
    TupleDesc::new(&types, &names)
}

pub fn int_tuple(values: &[i32]) -> Tuple {
    let desc = int_tuple_desc(values.len());
    let fields = values.iter().map(|v| Field::Int(IntField::new(*v))).collect();
    Tuple::new(desc, fields)
}

/// Registers a fresh heap table under a unique name and returns it
/// alongside its table id.
pub fn create_empty_heap_table(columns: usize) -> (Pod<HeapFile>, u32) {
    let path = new_temp_path();
    let file = HeapFile::new(&path, int_tuple_desc(columns)).unwrap();
    let table_id = file.get_table_id();
    let table = Arc::new(RwLock::new(file));
    Database::mut_catalog().add_heap_table(&path, table.clone());
    (table, table_id)
}

/// Inserts `rows` random tuples of `columns` int fields into a fresh
/// heap table and returns the table id plus the inserted rows (in
/// insertion order, matching what a scan immediately after should
/// yield).
pub fn create_random_heap_table(columns: usize, rows: usize) -> (u32, Vec<Vec<i32>>) {
    let (table, table_id) = create_empty_heap_table(columns);
    let mut rng = rand::thread_rng();
    let mut cells = Vec::with_capacity(rows);

    let tx = Transaction::new();
    for _ in 0..rows {
        let row: Vec<i32> = (0..columns).map(|_| rng.gen_range(0, i32::MAX)).collect();
        table.read().unwrap().insert_tuple(&tx, &int_tuple(&row)).unwrap();
        cells.push(row);
    }
    tx.commit().unwrap();

    (table_id, cells)
}

/// Registers a fresh B+ tree table keyed on column 0 and returns it
/// alongside its table id.
pub fn create_empty_btree_table(columns: usize) -> (Pod<BTreeTable>, u32) {
    let path = new_temp_path();
    let table = BTreeTable::new(&path, 0, int_tuple_desc(columns)).unwrap();
    let table_id = table.get_table_id();
    let table = Arc::new(RwLock::new(table));
    Database::mut_catalog().add_btree_table(&path, table.clone());
    (table, table_id)
}

/// Inserts `rows` tuples with distinct keys `0..rows` (shuffled before
/// insertion, so the tree actually exercises split logic rather than
/// only ever appending at the right edge) into a fresh B+ tree table.
/// Returns the table id plus the keys in the order they were inserted.
pub fn create_random_btree_table(columns: usize, rows: usize) -> (u32, Vec<i32>) {
    let (table, table_id) = create_empty_btree_table(columns);
    let mut keys: Vec<i32> = (0..rows as i32).collect();
    keys.shuffle(&mut rand::thread_rng());

    let tx = Transaction::new();
    for &k in &keys {
        let mut row = vec![k];
        row.extend((1..columns).map(|_| 0));
        table.read().unwrap().insert_tuple(&tx, &int_tuple(&row)).unwrap();
    }
    tx.commit().unwrap();

    (table_id, keys)
}
