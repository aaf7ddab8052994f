use std::{
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    path::Path,
    sync::Mutex,
};

use log::debug;

use crate::{
    concurrent_status::Permission,
    database::Database,
    config::get_page_size,
    error::SmallError,
    io::{read_at, write_at},
    iterator::{DbFile, DbFileIterator},
    page_id::PageId,
    transaction::Transaction,
    tuple::{Tuple, TupleDesc},
    types::SmallResult,
    util::HandyRwLock,
};

use super::page::HeapPage;

/// On-disk backing store for a single heap table: an unordered sequence
/// of fixed-size pages, each a `HeapPage` (spec §4.1). `table_id` is
/// derived deterministically from the canonical file path so the same
/// file always maps to the same id across process restarts.
pub struct HeapFile {
    file_path: String,
    file: Mutex<File>,
    scheme: TupleDesc,
    table_id: u32,
}

impl HeapFile {
    pub fn new(file_path: &str, scheme: TupleDesc) -> Result<Self, SmallError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(file_path)?;

        let table_id = Self::compute_table_id(file_path);
        Ok(Self {
            file_path: file_path.to_string(),
            file: Mutex::new(file),
            scheme,
            table_id,
        })
    }

    fn compute_table_id(file_path: &str) -> u32 {
        let canonical = Path::new(file_path)
            .canonicalize()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| file_path.to_string());
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        hasher.finish() as u32
    }

    pub fn get_table_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_tuple_desc(&self) -> TupleDesc {
        self.scheme.clone()
    }

    pub fn num_pages(&self) -> Result<usize, SmallError> {
        let file = self.file.lock().unwrap();
        let len = file.metadata()?.len() as usize;
        Ok(len / get_page_size())
    }

    pub fn read_page_bytes(&self, pid: &PageId) -> Result<Vec<u8>, SmallError> {
        let mut file = self.file.lock().unwrap();
        let offset = pid.page_no as u64 * get_page_size() as u64;
        if file.metadata()?.len() <= offset {
            return Ok(HeapPage::empty_page_data());
        }
        read_at(&mut file, offset, get_page_size())
    }

    pub fn write_page_bytes(&self, pid: &PageId, bytes: &[u8]) -> Result<(), SmallError> {
        let mut file = self.file.lock().unwrap();
        let offset = pid.page_no as u64 * get_page_size() as u64;
        write_at(&mut file, offset, bytes)
    }

    /// Appends a brand-new page at the end of the file and returns its id.
    fn allocate_page(&self) -> Result<PageId, SmallError> {
        let page_no = self.num_pages()? as u32;
        let pid = PageId::new(self.table_id, page_no);
        self.write_page_bytes(&pid, &HeapPage::empty_page_data())?;
        Ok(pid)
    }

    /// Finds a page with at least one empty slot, appending a fresh page
    /// if every existing page is full, then inserts `tuple` into it.
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> Result<(), SmallError> {
        let num_pages = self.num_pages()?;
        for page_no in 0..num_pages {
            let pid = PageId::new(self.table_id, page_no);
            let page_pod = Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;
            if page_pod.rl().get_num_empty_slots() > 0 {
                page_pod.wl().insert_tuple(tuple)?;
                page_pod.wl().mark_dirty(true, *tx);
                return Ok(());
            }
        }

        let pid = self.allocate_page()?;
        let page_pod = Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;
        page_pod.wl().insert_tuple(tuple)?;
        page_pod.wl().mark_dirty(true, *tx);
        debug!("heap file {}: appended page {}", self.table_id, pid);
        Ok(())
    }

    pub fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> Result<(), SmallError> {
        let rid = tuple
            .record_id
            .ok_or_else(|| SmallError::not_found("tuple has no record id"))?;
        let page_pod = Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &rid.page_id)?;
        page_pod.wl().delete_tuple(tuple)?;
        page_pod.wl().mark_dirty(true, *tx);
        Ok(())
    }

    pub fn iterator<'tx>(&self, tx: &'tx Transaction) -> Result<HeapFileIterator<'tx>, SmallError> {
        Ok(HeapFileIterator::new(tx, self.table_id, self.num_pages()?))
    }
}

impl DbFile for HeapFile {
    type PageId = PageId;

    fn get_id(&self) -> u32 {
        self.get_table_id()
    }

    fn get_tuple_desc(&self) -> TupleDesc {
        self.get_tuple_desc()
    }

    fn read_page(&self, pid: &PageId) -> Result<Vec<u8>, SmallError> {
        self.read_page_bytes(pid)
    }

    fn write_page(&self, pid: &PageId, bytes: &[u8]) -> SmallResult {
        self.write_page_bytes(pid, bytes)
    }

    fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> SmallResult {
        self.insert_tuple(tx, tuple)
    }

    fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> SmallResult {
        self.delete_tuple(tx, tuple)
    }

    fn iterator<'t>(&self, tx: &'t Transaction) -> Result<Box<dyn DbFileIterator<Item = Tuple> + 't>, SmallError> {
        Ok(Box::new(self.iterator(tx)?))
    }
}

/// Scans every page of a heap file in page order, yielding its tuples.
pub struct HeapFileIterator<'tx> {
    tx: &'tx Transaction,
    table_id: u32,
    num_pages: usize,
    page_no: usize,
    buf: Vec<Tuple>,
    buf_pos: usize,
}

impl<'tx> HeapFileIterator<'tx> {
    fn new(tx: &'tx Transaction, table_id: u32, num_pages: usize) -> Self {
        Self {
            tx,
            table_id,
            num_pages,
            page_no: 0,
            buf: Vec::new(),
            buf_pos: 0,
        }
    }

    fn load_page(&mut self, page_no: usize) -> Result<(), SmallError> {
        let pid = PageId::new(self.table_id, page_no as u32);
        let page_pod = Database::buffer_pool().get_heap_page(self.tx, Permission::ReadOnly, &pid)?;
        let page = page_pod.rl();
        self.buf = page.iter().cloned().collect();
        self.buf_pos = 0;
        Ok(())
    }
}

impl<'tx> Iterator for HeapFileIterator<'tx> {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.buf_pos < self.buf.len() {
                let t = self.buf[self.buf_pos].clone();
                self.buf_pos += 1;
                return Some(t);
            }
            if self.page_no >= self.num_pages {
                return None;
            }
            if self.load_page(self.page_no).is_err() {
                return None;
            }
            self.page_no += 1;
        }
    }
}

impl<'tx> DbFileIterator for HeapFileIterator<'tx> {
    type Item = Tuple;

    /// Resets the scan back to page 0. No page lock is held across this
    /// call; the next `has_next`/`next` re-requests one via `load_page`.
    fn open(&mut self) -> SmallResult {
        self.page_no = 0;
        self.buf.clear();
        self.buf_pos = 0;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, SmallError> {
        while self.buf_pos >= self.buf.len() {
            if self.page_no >= self.num_pages {
                return Ok(false);
            }
            self.load_page(self.page_no)?;
            self.page_no += 1;
        }
        Ok(true)
    }

    fn next(&mut self) -> Result<Tuple, SmallError> {
        if !DbFileIterator::has_next(self)? {
            return Err(SmallError::not_found("HeapFileIterator exhausted"));
        }
        let t = self.buf[self.buf_pos].clone();
        self.buf_pos += 1;
        Ok(t)
    }

    fn close(&mut self) {
        self.buf.clear();
        self.buf_pos = 0;
        self.page_no = self.num_pages;
    }
}
