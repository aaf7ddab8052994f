use std::collections::HashMap;

use crate::{
    btree::table::BTreeTable,
    error::SmallError,
    heap::file::HeapFile,
    tuple::TupleDesc,
    types::{Pod, ResultPod},
};

enum Registration {
    Heap(Pod<HeapFile>),
    BTree(Pod<BTreeTable>),
}

/// Table registry: maps a table id to the `DbFile` that owns it (spec
/// §6). Loading a catalog from disk is out of scope here — tables are
/// registered programmatically at startup via `add_heap_table` /
/// `add_btree_table`.
pub struct Catalog {
    tables: HashMap<u32, Registration>,
    names: HashMap<String, u32>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            names: HashMap::new(),
        }
    }

    pub fn add_heap_table(&mut self, name: &str, table: Pod<HeapFile>) {
        let table_id = table.read().unwrap().get_table_id();
        self.tables.insert(table_id, Registration::Heap(table));
        self.names.insert(name.to_string(), table_id);
    }

    pub fn add_btree_table(&mut self, name: &str, table: Pod<BTreeTable>) {
        let table_id = table.read().unwrap().get_table_id();
        self.tables.insert(table_id, Registration::BTree(table));
        self.names.insert(name.to_string(), table_id);
    }

    pub fn get_table_id(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    pub fn get_database_file(&self, table_id: u32) -> ResultPod<HeapFile> {
        match self.tables.get(&table_id) {
            Some(Registration::Heap(t)) => Ok(t.clone()),
            _ => Err(SmallError::not_found(&format!(
                "no heap table registered with id {}",
                table_id
            ))),
        }
    }

    pub fn get_btree_table(&self, table_id: u32) -> ResultPod<BTreeTable> {
        match self.tables.get(&table_id) {
            Some(Registration::BTree(t)) => Ok(t.clone()),
            _ => Err(SmallError::not_found(&format!(
                "no btree table registered with id {}",
                table_id
            ))),
        }
    }

    pub fn get_tuple_desc(&self, table_id: u32) -> Result<TupleDesc, SmallError> {
        match self.tables.get(&table_id) {
            Some(Registration::Heap(t)) => Ok(t.read().unwrap().get_tuple_desc()),
            Some(Registration::BTree(t)) => Ok(t.read().unwrap().get_tuple_desc()),
            None => Err(SmallError::not_found(&format!(
                "no table registered with id {}",
                table_id
            ))),
        }
    }

    pub fn table_id_iterator(&self) -> impl Iterator<Item = u32> + '_ {
        self.tables.keys().copied()
    }
}
