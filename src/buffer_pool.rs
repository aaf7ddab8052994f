use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::debug;

use crate::{
    btree::page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreePage, BTreeRootPointerPage,
    },
    btree::page_id::{BTreePageID, PageCategory},
    concurrent_status::{ConcurrentStatus, Lock, Permission},
    config::DEFAULT_BUFFER_POOL_CAPACITY,
    database::Database,
    error::SmallError,
    heap::page::HeapPage,
    page_id::PageId,
    page_key::PageKey,
    transaction::Transaction,
    types::{Pod, ResultPod, SmallResult},
    util::HandyRwLock,
};

/// Page cache + lock-manager integration (spec §4.4). Four resident
/// maps — one per B+ tree page category, plus one for heap pages — are
/// all guarded by the same capacity budget; the actual lock table lives
/// in `ConcurrentStatus`, accessed via `Database::concurrent_status()`.
pub struct BufferPool {
    capacity: usize,

    heap_pages: RwLock<HashMap<PageId, Pod<HeapPage>>>,
    root_pointer_pages: RwLock<HashMap<BTreePageID, Pod<BTreeRootPointerPage>>>,
    header_pages: RwLock<HashMap<BTreePageID, Pod<BTreeHeaderPage>>>,
    internal_pages: RwLock<HashMap<BTreePageID, Pod<BTreeInternalPage>>>,
    leaf_pages: RwLock<HashMap<BTreePageID, Pod<BTreeLeafPage>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_POOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            heap_pages: RwLock::new(HashMap::new()),
            root_pointer_pages: RwLock::new(HashMap::new()),
            header_pages: RwLock::new(HashMap::new()),
            internal_pages: RwLock::new(HashMap::new()),
            leaf_pages: RwLock::new(HashMap::new()),
        }
    }

    fn resident_count(&self) -> usize {
        self.heap_pages.rl().len()
            + self.root_pointer_pages.rl().len()
            + self.header_pages.rl().len()
            + self.internal_pages.rl().len()
            + self.leaf_pages.rl().len()
    }

    /// Picks any clean resident page and drops it (NO-STEAL eviction,
    /// spec §4.4). Fails `NoEvictablePage` if every resident page is
    /// dirty — a dirty page must never be written out ahead of its
    /// transaction's commit.
    fn evict_one(&self) -> SmallResult {
        {
            let pages = self.heap_pages.rl();
            if let Some(pid) = pages.iter().find(|(_, p)| p.rl().is_dirty().is_none()).map(|(k, _)| *k) {
                drop(pages);
                self.heap_pages.wl().remove(&pid);
                return Ok(());
            }
        }
        {
            let pages = self.leaf_pages.rl();
            if let Some(pid) = pages
                .iter()
                .find(|(_, p)| p.rl().is_dirty().is_none())
                .map(|(k, _)| k.clone())
            {
                drop(pages);
                self.leaf_pages.wl().remove(&pid);
                return Ok(());
            }
        }
        {
            let pages = self.internal_pages.rl();
            if let Some(pid) = pages
                .iter()
                .find(|(_, p)| p.rl().is_dirty().is_none())
                .map(|(k, _)| k.clone())
            {
                drop(pages);
                self.internal_pages.wl().remove(&pid);
                return Ok(());
            }
        }
        {
            let pages = self.header_pages.rl();
            if let Some(pid) = pages
                .iter()
                .find(|(_, p)| p.rl().is_dirty().is_none())
                .map(|(k, _)| k.clone())
            {
                drop(pages);
                self.header_pages.wl().remove(&pid);
                return Ok(());
            }
        }
        Err(SmallError::no_evictable_page(
            "buffer pool is full of dirty pages",
        ))
    }

    fn ensure_capacity(&self) -> SmallResult {
        if self.resident_count() >= self.capacity {
            self.evict_one()?;
        }
        Ok(())
    }

    pub fn get_heap_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<HeapPage> {
        Database::concurrent_status().request_lock(tx, &perm.to_lock(), &PageKey::Heap(*pid))?;

        if let Some(p) = self.heap_pages.rl().get(pid) {
            return Ok(Arc::clone(p));
        }

        self.ensure_capacity()?;

        let table = Database::catalog().get_database_file(pid.table_id)?;
        let bytes = table.rl().read_page_bytes(pid)?;
        let scheme = table.rl().get_tuple_desc();
        let page = Arc::new(RwLock::new(HeapPage::new(*pid, &bytes, &scheme)?));
        self.heap_pages.wl().insert(*pid, Arc::clone(&page));
        Ok(page)
    }

    pub fn get_root_ptr_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeRootPointerPage> {
        Database::concurrent_status().request_lock(tx, &perm.to_lock(), &PageKey::BTree(pid.clone()))?;
        if let Some(p) = self.root_pointer_pages.rl().get(pid) {
            return Ok(Arc::clone(p));
        }
        self.ensure_capacity()?;
        let table = Database::catalog().get_btree_table(pid.table_id)?;
        let bytes = table.rl().read_btree_page_bytes(pid)?;
        let page = Arc::new(RwLock::new(BTreeRootPointerPage::new(pid.table_id, &bytes)?));
        self.root_pointer_pages.wl().insert(pid.clone(), Arc::clone(&page));
        Ok(page)
    }

    pub fn get_header_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeHeaderPage> {
        Database::concurrent_status().request_lock(tx, &perm.to_lock(), &PageKey::BTree(pid.clone()))?;
        if let Some(p) = self.header_pages.rl().get(pid) {
            return Ok(Arc::clone(p));
        }
        self.ensure_capacity()?;
        let table = Database::catalog().get_btree_table(pid.table_id)?;
        let bytes = table.rl().read_btree_page_bytes(pid)?;
        let page = Arc::new(RwLock::new(BTreeHeaderPage::new(pid, &bytes)?));
        self.header_pages.wl().insert(pid.clone(), Arc::clone(&page));
        Ok(page)
    }

    pub fn get_internal_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeInternalPage> {
        Database::concurrent_status().request_lock(tx, &perm.to_lock(), &PageKey::BTree(pid.clone()))?;
        if let Some(p) = self.internal_pages.rl().get(pid) {
            return Ok(Arc::clone(p));
        }
        self.ensure_capacity()?;
        let table = Database::catalog().get_btree_table(pid.table_id)?;
        let bytes = table.rl().read_btree_page_bytes(pid)?;
        let scheme = table.rl().get_tuple_desc();
        let key_field = table.rl().key_field();
        let page = Arc::new(RwLock::new(BTreeInternalPage::new(pid, &bytes, &scheme, key_field)?));
        self.internal_pages.wl().insert(pid.clone(), Arc::clone(&page));
        Ok(page)
    }

    pub fn get_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeLeafPage> {
        Database::concurrent_status().request_lock(tx, &perm.to_lock(), &PageKey::BTree(pid.clone()))?;
        if let Some(p) = self.leaf_pages.rl().get(pid) {
            return Ok(Arc::clone(p));
        }
        self.ensure_capacity()?;
        let table = Database::catalog().get_btree_table(pid.table_id)?;
        let bytes = table.rl().read_btree_page_bytes(pid)?;
        let scheme = table.rl().get_tuple_desc();
        let key_field = table.rl().key_field();
        let page = Arc::new(RwLock::new(BTreeLeafPage::new(pid, &bytes, &scheme, key_field)?));
        self.leaf_pages.wl().insert(pid.clone(), Arc::clone(&page));
        Ok(page)
    }

    /// Installs a brand-new page the caller already "owns" (just
    /// allocated via the free-page chain), bypassing the normal
    /// lock-request path since no other transaction can know about it
    /// yet.
    pub fn install_leaf_page(&self, pid: BTreePageID, page: BTreeLeafPage) -> Pod<BTreeLeafPage> {
        let page = Arc::new(RwLock::new(page));
        self.leaf_pages.wl().insert(pid, Arc::clone(&page));
        page
    }

    pub fn install_internal_page(&self, pid: BTreePageID, page: BTreeInternalPage) -> Pod<BTreeInternalPage> {
        let page = Arc::new(RwLock::new(page));
        self.internal_pages.wl().insert(pid, Arc::clone(&page));
        page
    }

    pub fn install_header_page(&self, pid: BTreePageID, page: BTreeHeaderPage) -> Pod<BTreeHeaderPage> {
        let page = Arc::new(RwLock::new(page));
        self.header_pages.wl().insert(pid, Arc::clone(&page));
        page
    }

    pub fn discard_page(&self, pid: &BTreePageID) {
        match pid.category {
            PageCategory::RootPointer => {
                self.root_pointer_pages.wl().remove(pid);
            }
            PageCategory::Header => {
                self.header_pages.wl().remove(pid);
            }
            PageCategory::Internal => {
                self.internal_pages.wl().remove(pid);
            }
            PageCategory::Leaf => {
                self.leaf_pages.wl().remove(pid);
            }
        }
    }

    pub fn discard_heap_page(&self, pid: &PageId) {
        self.heap_pages.wl().remove(pid);
    }

    /// Flushes or discards every page `tx` holds a lock on (spec §4.4
    /// `transactionComplete`): commit flushes dirty pages to disk via
    /// the owning `DbFile`; abort discards them so they are re-read
    /// fresh from disk on next access (NO-STEAL unwind).
    pub fn transaction_complete(&self, tx: &Transaction, commit: bool) -> SmallResult {
        let pages = Database::concurrent_status().pages_held_by(tx);
        for key in pages {
            match key {
                PageKey::Heap(pid) => self.complete_heap_page(tx, &pid, commit)?,
                PageKey::BTree(pid) => self.complete_btree_page(tx, &pid, commit)?,
            }
        }
        Ok(())
    }

    fn complete_heap_page(&self, tx: &Transaction, pid: &PageId, commit: bool) -> SmallResult {
        let page = match self.heap_pages.rl().get(pid) {
            Some(p) => Arc::clone(p),
            None => return Ok(()),
        };
        let dirty = page.rl().is_dirty();
        if dirty != Some(*tx) {
            return Ok(());
        }
        if commit {
            let table = Database::catalog().get_database_file(pid.table_id)?;
            table.rl().write_page_bytes(pid, &page.rl().get_page_data())?;
            page.wl().mark_dirty(false, *tx);
            page.wl().set_before_image();
        } else {
            self.discard_heap_page(pid);
        }
        Ok(())
    }

    fn complete_btree_page(&self, tx: &Transaction, pid: &BTreePageID, commit: bool) -> SmallResult {
        macro_rules! complete {
            ($map:expr) => {{
                let page = match $map.rl().get(pid) {
                    Some(p) => Arc::clone(p),
                    None => return Ok(()),
                };
                let dirty = page.rl().is_dirty();
                if dirty != Some(*tx) {
                    return Ok(());
                }
                if commit {
                    let table = Database::catalog().get_btree_table(pid.table_id)?;
                    table.rl().write_btree_page_bytes(pid, &page.rl().get_page_data())?;
                    page.wl().mark_dirty(false, *tx);
                } else {
                    self.discard_page(pid);
                }
                return Ok(());
            }};
        }

        match pid.category {
            PageCategory::RootPointer => complete!(self.root_pointer_pages),
            PageCategory::Header => complete!(self.header_pages),
            PageCategory::Internal => complete!(self.internal_pages),
            PageCategory::Leaf => complete!(self.leaf_pages),
        }
    }

    pub fn flush_all_pages(&self) -> SmallResult {
        for (pid, page) in self.heap_pages.rl().iter() {
            if page.rl().is_dirty().is_some() {
                let table = Database::catalog().get_database_file(pid.table_id)?;
                table.rl().write_page_bytes(pid, &page.rl().get_page_data())?;
            }
        }
        debug!("flushed all resident pages");
        Ok(())
    }
}
