use std::{
    cmp,
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    path::Path,
    sync::{atomic::{AtomicU32, Ordering}, Mutex},
};

use log::debug;

use crate::{
    btree::page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeInternalPageIterator, BTreeLeafPage,
        BTreeLeafPageIterator, BTreePage, Entry,
    },
    btree::page_id::{BTreePageID, PageCategory},
    concurrent_status::Permission,
    config::get_page_size,
    database::Database,
    error::SmallError,
    field::Field,
    iterator::{DbFile, DbFileIterator, RestartableIter},
    transaction::Transaction,
    tuple::{Tuple, TupleDesc, WrappedTuple},
    types::{Pod, SmallResult},
    util::HandyRwLock,
};

use super::page::root_pointer_page::ROOT_PTR_SIZE;

/// Grows or shrinks in place; always has at least a root-pointer page
/// and one leaf page once created (spec §4.3). `table_id` is derived
/// deterministically from the canonical file path, matching the heap
/// file's convention so a fresh process re-attaches to the same id.
pub struct BTreeTable {
    file: Mutex<File>,
    key_field: usize,
    scheme: TupleDesc,
    table_id: u32,
    next_page_index: AtomicU32,
}

impl BTreeTable {
    pub fn new(file_path: &str, key_field: usize, scheme: TupleDesc) -> Result<Self, SmallError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(file_path)?;

        let table_id = Self::compute_table_id(file_path);

        let len = {
            use std::io::Write;
            let metadata_len = file.metadata()?.len();
            if metadata_len == 0 {
                let root_ptr = super::page::root_pointer_page::BTreeRootPointerPage::empty(table_id);
                file.write_all(&root_ptr.get_page_data())?;

                let leaf_pid = BTreePageID::new(PageCategory::Leaf, table_id, 1);
                let leaf = BTreeLeafPage::new(&leaf_pid, &vec![0u8; get_page_size()], &scheme, key_field)?;
                file.write_all(&leaf.get_page_data())?;

                let mut root_ptr_with_root =
                    super::page::root_pointer_page::BTreeRootPointerPage::empty(table_id);
                root_ptr_with_root.set_root_pid(&leaf_pid);
                use std::io::{Seek, SeekFrom};
                file.seek(SeekFrom::Start(0))?;
                file.write_all(&root_ptr_with_root.get_page_data())?;
                file.flush()?;
                1u64
            } else {
                (metadata_len - ROOT_PTR_SIZE as u64) / get_page_size() as u64
            }
        };

        Ok(Self {
            file: Mutex::new(file),
            key_field,
            scheme,
            table_id,
            next_page_index: AtomicU32::new(len as u32),
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

    pub fn key_field(&self) -> usize {
        self.key_field
    }

    fn page_offset(pid: &BTreePageID) -> u64 {
        ROOT_PTR_SIZE as u64 + (pid.page_index - 1) as u64 * get_page_size() as u64
    }

    pub fn read_btree_page_bytes(&self, pid: &BTreePageID) -> Result<Vec<u8>, SmallError> {
        use crate::io::read_at;
        let mut file = self.file.lock().unwrap();
        if pid.category == PageCategory::RootPointer {
            return crate::io::read_at(&mut file, 0, ROOT_PTR_SIZE);
        }
        let offset = Self::page_offset(pid);
        if file.metadata()?.len() <= offset {
            return Ok(vec![0u8; get_page_size()]);
        }
        read_at(&mut file, offset, get_page_size())
    }

    pub fn write_btree_page_bytes(&self, pid: &BTreePageID, bytes: &[u8]) -> SmallResult {
        use crate::io::write_at;
        let mut file = self.file.lock().unwrap();
        let offset = if pid.category == PageCategory::RootPointer {
            0
        } else {
            Self::page_offset(pid)
        };
        write_at(&mut file, offset, bytes)
    }

    pub fn get_root_ptr_page(&self, tx: &Transaction) -> crate::types::ResultPod<super::page::BTreeRootPointerPage> {
        Database::buffer_pool().get_root_ptr_page(tx, Permission::ReadOnly, &BTreePageID::root_ptr(self.table_id))
    }

    pub fn get_root_pid(&self, tx: &Transaction) -> Result<BTreePageID, SmallError> {
        let root_ptr = self.get_root_ptr_page(tx)?;
        let pid = root_ptr.rl().get_root_pid().ok_or_else(|| {
            SmallError::illegal_page("btree table has no root page")
        })?;
        Ok(pid)
    }

    pub fn pages_count(&self) -> usize {
        self.next_page_index.load(Ordering::Relaxed) as usize
    }

    fn allocate_raw_page_index(&self) -> u32 {
        self.next_page_index.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Free-page management: a bitmap chain of header pages, each covering
/// a fixed run of `BTreeHeaderPage::num_slots()` page indices (spec
/// §3/§4.3). Unlike a flat `page_index % slots` lookup, freeing or
/// reusing a page always walks to the header page actually responsible
/// for that index's range.
impl BTreeTable {
    fn get_empty_page_index(&self, tx: &Transaction) -> Result<u32, SmallError> {
        let slots_per_header = BTreeHeaderPage::num_slots() as u32;
        let root_ptr_pod = self.get_root_ptr_page(tx)?;
        let mut maybe_header_pid = root_ptr_pod.rl().get_header_pid();
        let mut chain_pos = 0u32;
        let mut prev_header_pid: Option<BTreePageID> = None;

        while let Some(header_pid) = maybe_header_pid {
            let header_pod =
                Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &header_pid)?;
            if let Some(slot) = header_pod.rl().get_empty_slot() {
                header_pod.wl().mark_slot_status(slot, true);
                header_pod.wl().mark_dirty(true, *tx);
                return Ok(chain_pos * slots_per_header + slot as u32 + 1);
            }
            prev_header_pid = Some(header_pid);
            maybe_header_pid = header_pod.rl().get_next_pid();
            chain_pos += 1;
        }

        let new_header_index = self.allocate_raw_page_index();
        let new_header_pid = BTreePageID::new(PageCategory::Header, self.table_id, new_header_index);
        let mut new_header = BTreeHeaderPage::empty(&new_header_pid);
        new_header.mark_slot_status(0, true);
        new_header.mark_dirty(true, *tx);
        self.write_btree_page_bytes(&new_header_pid, &new_header.get_page_data())?;
        let new_header_pod = Database::buffer_pool().install_header_page(new_header_pid.clone(), new_header);

        if let Some(prev_pid) = prev_header_pid {
            let prev_pod =
                Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &prev_pid)?;
            prev_pod.wl().set_next_pid(Some(new_header_pid.clone()));
            prev_pod.wl().mark_dirty(true, *tx);
            new_header_pod.wl().set_prev_pid(Some(prev_pid));
        } else {
            root_ptr_pod.wl().set_header_pid(Some(new_header_pid.clone()));
            root_ptr_pod.wl().mark_dirty(true, *tx);
        }

        Ok(chain_pos * slots_per_header + 1)
    }

    fn set_empty_page(&self, tx: &Transaction, pid: &BTreePageID) -> SmallResult {
        Database::buffer_pool().discard_page(pid);

        let slots_per_header = BTreeHeaderPage::num_slots() as u32;
        let target_pos = (pid.page_index - 1) / slots_per_header;
        let slot = ((pid.page_index - 1) % slots_per_header) as usize;

        let root_ptr_pod = self.get_root_ptr_page(tx)?;
        let mut maybe_header_pid = root_ptr_pod.rl().get_header_pid();
        let mut pos = 0u32;
        while let Some(header_pid) = maybe_header_pid {
            let header_pod =
                Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &header_pid)?;
            if pos == target_pos {
                header_pod.wl().mark_slot_status(slot, false);
                header_pod.wl().mark_dirty(true, *tx);
                return Ok(());
            }
            maybe_header_pid = header_pod.rl().get_next_pid();
            pos += 1;
        }
        debug!("set_empty_page: header chain does not cover page {}, ignoring", pid);
        Ok(())
    }

    fn allocate_leaf_page(&self, tx: &Transaction) -> Result<Pod<BTreeLeafPage>, SmallError> {
        let index = self.get_empty_page_index(tx)?;
        let pid = BTreePageID::new(PageCategory::Leaf, self.table_id, index);
        let mut page = BTreeLeafPage::new(&pid, &vec![0u8; get_page_size()], &self.scheme, self.key_field)?;
        page.mark_dirty(true, *tx);
        self.write_btree_page_bytes(&pid, &page.get_page_data())?;
        Ok(Database::buffer_pool().install_leaf_page(pid, page))
    }

    fn allocate_internal_page(&self, tx: &Transaction) -> Result<Pod<BTreeInternalPage>, SmallError> {
        let index = self.get_empty_page_index(tx)?;
        let pid = BTreePageID::new(PageCategory::Internal, self.table_id, index);
        let mut page = BTreeInternalPage::new(&pid, &vec![0u8; get_page_size()], &self.scheme, self.key_field)?;
        page.mark_dirty(true, *tx);
        self.write_btree_page_bytes(&pid, &page.get_page_data())?;
        Ok(Database::buffer_pool().install_internal_page(pid, page))
    }
}

enum SearchFor {
    Key(Field),
    LeftMost,
    RightMost,
}

/// Insert/split.
impl BTreeTable {
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> SmallResult {
        let root_pid = self.get_root_pid(tx)?;
        let key = tuple.get_field(self.key_field).clone();
        let leaf_pod = self.find_leaf_page(tx, Permission::ReadWrite, root_pid, SearchFor::Key(key))?;

        let full = leaf_pod.rl().empty_slots_count() == 0;
        let leaf_pod = if full {
            self.split_leaf_page(tx, leaf_pod, tuple.get_field(self.key_field).clone())?
        } else {
            leaf_pod
        };

        leaf_pod.wl().insert_tuple(tuple)?;
        leaf_pod.wl().mark_dirty(true, *tx);
        Ok(())
    }

    /// Moves the right half of `page_rc`'s tuples into a fresh sibling,
    /// pushes the first key of the new sibling up into the parent (an
    /// internal page, splitting it first if necessary), and returns
    /// whichever of the two pages `field` belongs on.
    fn split_leaf_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeLeafPage>,
        field: Field,
    ) -> crate::types::ResultPod<BTreeLeafPage> {
        let sibling_rc = self.allocate_leaf_page(tx)?;
        let parent_pid;
        let up_key;

        {
            let mut page = page_rc.wl();
            let mut sibling = sibling_rc.wl();

            let move_count = page.tuples_count() / 2;
            let mut moved_slots = Vec::new();
            let mut moved_tuples = Vec::new();
            {
                let mut it = BTreeLeafPageIterator::new(&page);
                for t in it.by_ref().rev().take(move_count) {
                    moved_slots.push(t.get_slot_number());
                    moved_tuples.push(t.get_tuple().clone());
                }
            }
            for t in &moved_tuples {
                sibling.insert_tuple(t)?;
            }
            for slot in moved_slots {
                page.delete_tuple(slot);
            }

            up_key = {
                let mut it = BTreeLeafPageIterator::new(&page);
                it.next_back().unwrap().get_field(self.key_field).clone()
            };

            if let Some(old_right) = page.get_right_pid() {
                let old_right_pod =
                    Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &old_right)?;
                old_right_pod.wl().set_left_pid(Some(sibling.get_pid()));
                old_right_pod.wl().mark_dirty(true, *tx);
            }
            sibling.set_right_pid(page.get_right_pid());
            sibling.set_left_pid(Some(page.get_pid()));
            page.set_right_pid(Some(sibling.get_pid()));

            parent_pid = page.get_parent_pid();
        }

        let parent_rc = self.get_parent_with_empty_slots(tx, parent_pid)?;
        {
            let mut parent = parent_rc.wl();
            let mut page = page_rc.wl();
            let mut sibling = sibling_rc.wl();

            let entry = Entry::new(&up_key, &page.get_pid(), &sibling.get_pid());
            parent.insert_entry(&entry)?;
            parent.mark_dirty(true, *tx);

            page.set_parent_pid(&parent.get_pid());
            sibling.set_parent_pid(&parent.get_pid());
            page.mark_dirty(true, *tx);
            sibling.mark_dirty(true, *tx);
        }

        if field > up_key {
            Ok(sibling_rc)
        } else {
            Ok(page_rc)
        }
    }

    /// Returns a parent internal page with at least one empty slot,
    /// creating a new root or splitting the existing parent first if
    /// needed.
    fn get_parent_with_empty_slots(
        &self,
        tx: &Transaction,
        parent_pid: BTreePageID,
    ) -> crate::types::ResultPod<BTreeInternalPage> {
        match parent_pid.category {
            PageCategory::RootPointer => {
                let new_parent = self.allocate_internal_page(tx)?;
                let root_ptr_pod = Database::buffer_pool().get_root_ptr_page(
                    tx,
                    Permission::ReadWrite,
                    &BTreePageID::root_ptr(self.table_id),
                )?;
                root_ptr_pod.wl().set_root_pid(&new_parent.rl().get_pid());
                root_ptr_pod.wl().mark_dirty(true, *tx);
                Ok(new_parent)
            }
            PageCategory::Internal => {
                let parent_pod =
                    Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_pid)?;
                if parent_pod.rl().empty_slots_count() > 0 {
                    Ok(parent_pod)
                } else {
                    self.split_internal_page(tx, parent_pod)
                }
            }
            _ => unreachable!("a leaf/header page can never be a parent"),
        }
    }

    fn split_internal_page(
        &self,
        tx: &Transaction,
        page_rc: Pod<BTreeInternalPage>,
    ) -> crate::types::ResultPod<BTreeInternalPage> {
        let sibling_rc = self.allocate_internal_page(tx)?;
        let parent_pid;
        let up_key;

        {
            let mut page = page_rc.wl();
            let mut sibling = sibling_rc.wl();

            parent_pid = page.get_parent_pid();

            let move_count = page.entries_count() / 2;
            let mut moved_records = Vec::new();
            let mut moved_entries = Vec::new();
            let middle_entry;
            {
                let mut it = BTreeInternalPageIterator::new(&page);
                for e in it.by_ref().rev().take(move_count) {
                    moved_records.push(e.get_record_id());
                    moved_entries.push(e);
                }
                middle_entry = it
                    .next_back()
                    .ok_or_else(|| SmallError::illegal_page("internal split: no middle entry to push up"))?;
            }
            for e in &moved_entries {
                sibling.insert_entry(e)?;
                self.reparent_child(tx, &e.get_right_child(), &sibling.get_pid())?;
            }

            moved_records.push(middle_entry.get_record_id());
            for i in moved_records {
                page.delete_key_and_right_child(i);
            }
            self.reparent_child(tx, &middle_entry.get_right_child(), &sibling.get_pid())?;

            up_key = middle_entry.get_key();
        }

        let parent_rc = self.get_parent_with_empty_slots(tx, parent_pid)?;
        {
            let parent_actual_pid = parent_rc.rl().get_pid();
            page_rc.wl().set_parent_pid(&parent_actual_pid);
            sibling_rc.wl().set_parent_pid(&parent_actual_pid);
            page_rc.wl().mark_dirty(true, *tx);
            sibling_rc.wl().mark_dirty(true, *tx);

            let entry = Entry::new(&up_key, &page_rc.rl().get_pid(), &sibling_rc.rl().get_pid());
            parent_rc.wl().insert_entry(&entry)?;
            parent_rc.wl().mark_dirty(true, *tx);
        }

        Ok(sibling_rc)
    }

    fn reparent_child(&self, tx: &Transaction, child: &BTreePageID, parent: &BTreePageID) -> SmallResult {
        match child.category {
            PageCategory::Leaf => {
                let pod = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, child)?;
                pod.wl().set_parent_pid(parent);
                pod.wl().mark_dirty(true, *tx);
            }
            PageCategory::Internal => {
                let pod = Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, child)?;
                pod.wl().set_parent_pid(parent);
                pod.wl().mark_dirty(true, *tx);
            }
            _ => unreachable!("only leaf/internal pages are children"),
        }
        Ok(())
    }

    fn find_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        page_id: BTreePageID,
        search: SearchFor,
    ) -> crate::types::ResultPod<BTreeLeafPage> {
        match page_id.category {
            PageCategory::Leaf => Database::buffer_pool().get_leaf_page(tx, perm, &page_id),
            PageCategory::Internal => {
                let page_pod = Database::buffer_pool().get_internal_page(tx, Permission::ReadOnly, &page_id)?;
                let child_pid = {
                    let page = page_pod.rl();
                    let mut it = BTreeInternalPageIterator::new(&page);
                    let mut last_entry = None;
                    let mut found = None;
                    match &search {
                        SearchFor::Key(field) => {
                            for e in it {
                                if &e.get_key() >= field {
                                    found = Some(e.get_left_child());
                                    break;
                                }
                                last_entry = Some(e);
                            }
                            found.or_else(|| last_entry.map(|e| e.get_right_child()))
                        }
                        SearchFor::LeftMost => it.next().map(|e| e.get_left_child()),
                        SearchFor::RightMost => it.next_back().map(|e| e.get_right_child()),
                    }
                };
                let child_pid = child_pid.ok_or_else(|| {
                    SmallError::illegal_page("internal page has no entries to descend into")
                })?;
                self.find_leaf_page(tx, perm, child_pid, search)
            }
            _ => Err(SmallError::illegal_page("cannot search from a non-internal, non-leaf page")),
        }
    }
}

/// Delete/merge/redistribute.
impl BTreeTable {
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &WrappedTuple) -> SmallResult {
        let pid = tuple.get_pid();
        let leaf_pod = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &pid)?;
        leaf_pod.wl().delete_tuple(tuple.get_slot_number());
        leaf_pod.wl().mark_dirty(true, *tx);

        if leaf_pod.rl().should_merge() {
            self.handle_erratic_leaf_page(tx, leaf_pod)?;
        }
        Ok(())
    }

    /// Locates `tuple` by descending on its key field and deletes it,
    /// for callers (the operator layer) that only have a plain `Tuple`
    /// rather than the `WrappedTuple` slot/page identity `delete_tuple`
    /// needs.
    pub fn delete_tuple_by_key(&self, tx: &Transaction, tuple: &Tuple) -> SmallResult {
        let key = tuple.get_field(self.key_field).clone();
        let root_pid = self.get_root_pid(tx)?;
        let leaf_pod = self.find_leaf_page(tx, Permission::ReadWrite, root_pid, SearchFor::Key(key))?;
        let matched = {
            let leaf = leaf_pod.rl();
            BTreeLeafPageIterator::new(&leaf).find(|wt| wt.get_tuple() == tuple)
        };
        let wrapped =
            matched.ok_or_else(|| SmallError::not_found("no matching tuple to delete"))?;
        self.delete_tuple(tx, &wrapped)
    }

    fn children_in_order(parent: &BTreeInternalPage) -> Vec<BTreePageID> {
        let mut out = Vec::new();
        let mut it = BTreeInternalPageIterator::new(parent);
        if let Some(first) = it.next() {
            out.push(first.get_left_child());
            out.push(first.get_right_child());
            for e in it {
                out.push(e.get_right_child());
            }
        }
        out
    }

    fn siblings_of(parent: &BTreeInternalPage, pid: &BTreePageID) -> (Option<BTreePageID>, Option<BTreePageID>) {
        let children = Self::children_in_order(parent);
        let idx = match children.iter().position(|c| c == pid) {
            Some(i) => i,
            None => return (None, None),
        };
        let left = if idx > 0 { Some(children[idx - 1].clone()) } else { None };
        let right = children.get(idx + 1).cloned();
        (left, right)
    }

    fn handle_erratic_leaf_page(&self, tx: &Transaction, page_rc: Pod<BTreeLeafPage>) -> SmallResult {
        let parent_pid = page_rc.rl().get_parent_pid();
        if parent_pid.category == PageCategory::RootPointer {
            return Ok(());
        }
        let parent_pod = Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_pid)?;
        let (left_pid, right_pid) = Self::siblings_of(&parent_pod.rl(), &page_rc.rl().get_pid());

        if let Some(left_pid) = left_pid {
            let left_pod = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &left_pid)?;
            self.balance_leaf_pages(tx, left_pod, page_rc, parent_pod)
        } else if let Some(right_pid) = right_pid {
            let right_pod = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &right_pid)?;
            self.balance_leaf_pages(tx, page_rc, right_pod, parent_pod)
        } else {
            Err(SmallError::illegal_page("erratic leaf page has no sibling to balance with"))
        }
    }

    fn handle_erratic_internal_page(&self, tx: &Transaction, page_rc: Pod<BTreeInternalPage>) -> SmallResult {
        let parent_pid = page_rc.rl().get_parent_pid();
        if parent_pid.category == PageCategory::RootPointer {
            return Ok(());
        }
        let parent_pod = Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_pid)?;
        let (left_pid, right_pid) = Self::siblings_of(&parent_pod.rl(), &page_rc.rl().get_pid());

        if let Some(left_pid) = left_pid {
            let left_pod = Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &left_pid)?;
            self.balance_internal_pages(tx, left_pod, page_rc, parent_pod)
        } else if let Some(right_pid) = right_pid {
            let right_pod = Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &right_pid)?;
            self.balance_internal_pages(tx, page_rc, right_pod, parent_pod)
        } else {
            Err(SmallError::illegal_page("erratic internal page has no sibling to balance with"))
        }
    }

    fn balance_leaf_pages(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeLeafPage>,
        right_rc: Pod<BTreeLeafPage>,
        parent_rc: Pod<BTreeInternalPage>,
    ) -> SmallResult {
        let entry = parent_rc
            .rl()
            .get_entry_by_children(&left_rc.rl().get_pid(), &right_rc.rl().get_pid())
            .ok_or_else(|| SmallError::illegal_page("no parent entry links the two leaf siblings"))?;

        let left_count = left_rc.rl().tuples_count();
        let right_count = right_rc.rl().tuples_count();
        if left_count + right_count <= left_rc.rl().get_slots_count() {
            return self.merge_leaf_pages(tx, left_rc, right_rc, parent_rc, &entry);
        }

        let move_count = (left_count + right_count) / 2 - cmp::min(left_count, right_count);
        if move_count == 0 {
            return self.merge_leaf_pages(tx, left_rc, right_rc, parent_rc, &entry);
        }

        let mut key = entry.get_key();
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();
            if left_count < right_count {
                let mut moved_slots = Vec::new();
                let mut moved_tuples = Vec::new();
                {
                    let it = BTreeLeafPageIterator::new(&right);
                    for t in it.take(move_count) {
                        moved_slots.push(t.get_slot_number());
                        moved_tuples.push(t.get_tuple().clone());
                        key = t.get_field(self.key_field).clone();
                    }
                }
                for t in &moved_tuples {
                    left.insert_tuple(t)?;
                }
                for s in moved_slots {
                    right.delete_tuple(s);
                }
            } else {
                let mut moved_slots = Vec::new();
                let mut moved_tuples = Vec::new();
                {
                    let mut it = BTreeLeafPageIterator::new(&left);
                    for t in it.by_ref().rev().take(move_count) {
                        moved_slots.push(t.get_slot_number());
                        moved_tuples.push(t.get_tuple().clone());
                    }
                    // the new separator is the largest key remaining on the
                    // left page, i.e. the next one back after the steal.
                    if let Some(remaining_max) = it.next_back() {
                        key = remaining_max.get_field(self.key_field).clone();
                    }
                }
                for t in &moved_tuples {
                    right.insert_tuple(t)?;
                }
                for s in moved_slots {
                    left.delete_tuple(s);
                }
            }
            left.mark_dirty(true, *tx);
            right.mark_dirty(true, *tx);
        }

        let mut updated = entry;
        updated.set_key(key);
        parent_rc.wl().update_entry(&updated);
        parent_rc.wl().mark_dirty(true, *tx);
        Ok(())
    }

    fn merge_leaf_pages(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeLeafPage>,
        right_rc: Pod<BTreeLeafPage>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> SmallResult {
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            let mut moved_slots = Vec::new();
            let mut moved_tuples = Vec::new();
            {
                let it = BTreeLeafPageIterator::new(&right);
                for t in it {
                    moved_slots.push(t.get_slot_number());
                    moved_tuples.push(t.get_tuple().clone());
                }
            }
            for t in &moved_tuples {
                left.insert_tuple(t)?;
            }
            for s in moved_slots {
                right.delete_tuple(s);
            }

            left.set_right_pid(right.get_right_pid());
            if let Some(newer_right) = right.get_right_pid() {
                let newer_right_pod =
                    Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &newer_right)?;
                newer_right_pod.wl().set_left_pid(Some(left.get_pid()));
                newer_right_pod.wl().mark_dirty(true, *tx);
            }
            left.mark_dirty(true, *tx);
            self.set_empty_page(tx, &right.get_pid())?;
        }

        self.delete_parent_entry(tx, left_rc.rl().get_pid(), parent_rc, entry)
    }

    fn balance_internal_pages(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeInternalPage>,
        right_rc: Pod<BTreeInternalPage>,
        parent_rc: Pod<BTreeInternalPage>,
    ) -> SmallResult {
        let mut entry = parent_rc
            .rl()
            .get_entry_by_children(&left_rc.rl().get_pid(), &right_rc.rl().get_pid())
            .ok_or_else(|| SmallError::illegal_page("no parent entry links the two internal siblings"))?;

        let left_count = left_rc.rl().entries_count();
        let right_count = right_rc.rl().entries_count();
        let key_size = self.scheme.get_field_type(self.key_field).len();
        let max_entries = BTreeInternalPage::get_max_entries(key_size);

        if left_count + right_count < max_entries {
            return self.merge_internal_pages(tx, left_rc, right_rc, parent_rc, &entry);
        }

        let move_count = (left_count + right_count) / 2 - cmp::min(left_count, right_count);
        if move_count == 0 {
            return Ok(());
        }

        let mut middle_key = entry.get_key();
        if left_count < right_count {
            let mut edge = left_rc.rl().get_last_child_pid().unwrap();
            let entries: Vec<Entry> = BTreeInternalPageIterator::new(&right_rc.rl()).take(move_count).collect();
            let mut moved = Vec::new();
            for e in &entries {
                let new_entry = Entry::new(&middle_key, &edge, &e.get_left_child());
                left_rc.wl().insert_entry(&new_entry)?;
                self.reparent_child(tx, &e.get_left_child(), &left_rc.rl().get_pid())?;
                middle_key = e.get_key();
                edge = e.get_left_child();
                moved.push(e.get_record_id());
            }
            for i in moved {
                right_rc.wl().delete_key_and_left_child(i);
            }
        } else {
            let mut edge = right_rc.rl().get_first_child_pid().unwrap();
            let entries: Vec<Entry> = BTreeInternalPageIterator::new(&left_rc.rl()).rev().take(move_count).collect();
            let mut moved = Vec::new();
            for e in &entries {
                let new_entry = Entry::new(&middle_key, &e.get_right_child(), &edge);
                right_rc.wl().insert_entry(&new_entry)?;
                self.reparent_child(tx, &e.get_right_child(), &right_rc.rl().get_pid())?;
                middle_key = e.get_key();
                edge = e.get_right_child();
                moved.push(e.get_record_id());
            }
            for i in moved {
                left_rc.wl().delete_key_and_right_child(i);
            }
        }

        left_rc.wl().mark_dirty(true, *tx);
        right_rc.wl().mark_dirty(true, *tx);
        entry.set_key(middle_key);
        parent_rc.wl().update_entry(&entry);
        parent_rc.wl().mark_dirty(true, *tx);
        Ok(())
    }

    fn merge_internal_pages(
        &self,
        tx: &Transaction,
        left_rc: Pod<BTreeInternalPage>,
        right_rc: Pod<BTreeInternalPage>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> SmallResult {
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            let edge_entry = Entry::new(&entry.get_key(), &left.get_last_child_pid().unwrap(), &right.get_first_child_pid().unwrap());
            self.reparent_child(tx, &right.get_first_child_pid().unwrap(), &left.get_pid())?;
            left.insert_entry(&edge_entry)?;

            let mut moved = Vec::new();
            let entries: Vec<Entry> = BTreeInternalPageIterator::new(&right).collect();
            for e in &entries {
                left.insert_entry(e)?;
                self.reparent_child(tx, &e.get_right_child(), &left.get_pid())?;
                moved.push(e.get_record_id());
            }
            for i in moved {
                right.delete_key_and_right_child(i);
            }
            left.mark_dirty(true, *tx);
            self.set_empty_page(tx, &right.get_pid())?;
        }

        self.delete_parent_entry(tx, left_rc.rl().get_pid(), parent_rc, entry)
    }

    /// Deletes the parent entry that used to separate the merged pair;
    /// if that empties the parent, the surviving child becomes the new
    /// root; if the parent is merely unstable, cascades into another
    /// balance/merge round.
    fn delete_parent_entry(
        &self,
        tx: &Transaction,
        surviving_child: BTreePageID,
        parent_rc: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> SmallResult {
        let became_root = {
            let mut parent = parent_rc.wl();
            parent.delete_key_and_right_child(entry.get_record_id());
            parent.mark_dirty(true, *tx);

            if parent.entries_count() == 0 {
                true
            } else {
                false
            }
        };

        if became_root {
            let root_ptr_pid = BTreePageID::root_ptr(self.table_id);
            let root_ptr_pod =
                Database::buffer_pool().get_root_ptr_page(tx, Permission::ReadWrite, &root_ptr_pid)?;
            self.reparent_child(tx, &surviving_child, &root_ptr_pid)?;
            root_ptr_pod.wl().set_root_pid(&surviving_child);
            root_ptr_pod.wl().mark_dirty(true, *tx);
            self.set_empty_page(tx, &parent_rc.rl().get_pid())?;
            return Ok(());
        }

        if parent_rc.rl().stable() {
            return Ok(());
        }

        self.handle_erratic_internal_page(tx, parent_rc)
    }
}

/// Iteration.
impl BTreeTable {
    pub fn iter<'t>(&self, tx: &'t Transaction) -> Result<BTreeTableIterator<'t>, SmallError> {
        let root_pid = self.get_root_pid(tx)?;
        let first = self.find_leaf_page(tx, Permission::ReadOnly, root_pid, SearchFor::LeftMost)?;
        Ok(BTreeTableIterator::new(tx, first))
    }

    pub fn search<'t>(&self, tx: &'t Transaction, predicate: Predicate) -> Result<BTreeTableSearchIterator<'t>, SmallError> {
        let root_pid = self.get_root_pid(tx)?;
        let search = match predicate.op {
            Op::LessThan | Op::LessThanOrEq => SearchFor::LeftMost,
            _ => SearchFor::Key(predicate.field.clone()),
        };
        let start = self.find_leaf_page(tx, Permission::ReadOnly, root_pid, search)?;
        Ok(BTreeTableSearchIterator::new(tx, start, predicate, self.key_field))
    }

    /// Same rows as `search`, but restartable: the table is re-looked-up
    /// by id and re-descended from the root on every `open`/`rewind`
    /// instead of replaying one fixed starting leaf, so a rewind picks
    /// up concurrent writes and re-acquires its locks fresh.
    pub fn restartable_search<'t>(
        &self,
        tx: &'t Transaction,
        predicate: Predicate,
    ) -> Result<Box<dyn DbFileIterator<Item = Tuple> + 't>, SmallError> {
        let table_id = self.get_table_id();
        let factory = move || -> Result<_, SmallError> {
            let table = Database::catalog().get_btree_table(table_id)?;
            let it = table.read().unwrap().search(tx, predicate.clone())?;
            Ok(it.map(|wt| wt.get_tuple().clone()))
        };
        Ok(Box::new(RestartableIter::new(factory)))
    }

    pub fn check_integrity(&self, tx: &Transaction, check_occupancy: bool) -> Result<(), SmallError> {
        let root_pid = self.get_root_pid(tx)?;
        self.check_sub_tree(tx, &root_pid, &BTreePageID::root_ptr(self.table_id), None, None, check_occupancy, 0)
    }

    fn check_sub_tree(
        &self,
        tx: &Transaction,
        pid: &BTreePageID,
        parent_pid: &BTreePageID,
        lower: Option<Field>,
        upper: Option<Field>,
        check_occupancy: bool,
        depth: usize,
    ) -> Result<(), SmallError> {
        match pid.category {
            PageCategory::Leaf => {
                let pod = Database::buffer_pool().get_leaf_page(tx, Permission::ReadOnly, pid)?;
                pod.rl().check_integrity(parent_pid, lower, upper, check_occupancy, depth);
                Ok(())
            }
            PageCategory::Internal => {
                let pod = Database::buffer_pool().get_internal_page(tx, Permission::ReadOnly, pid)?;
                pod.rl().check_integrity(parent_pid, lower.clone(), upper.clone(), check_occupancy, depth);

                let entries: Vec<Entry> = BTreeInternalPageIterator::new(&pod.rl()).collect();
                for (i, e) in entries.iter().enumerate() {
                    let child_lower = if i == 0 { lower.clone() } else { Some(entries[i - 1].get_key()) };
                    self.check_sub_tree(tx, &e.get_left_child(), pid, child_lower, Some(e.get_key()), check_occupancy, depth + 1)?;
                }
                if let Some(last) = entries.last() {
                    self.check_sub_tree(tx, &last.get_right_child(), pid, Some(last.get_key()), upper, check_occupancy, depth + 1)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl DbFile for BTreeTable {
    type PageId = BTreePageID;

    fn get_id(&self) -> u32 {
        self.get_table_id()
    }

    fn get_tuple_desc(&self) -> TupleDesc {
        self.get_tuple_desc()
    }

    fn read_page(&self, pid: &BTreePageID) -> Result<Vec<u8>, SmallError> {
        self.read_btree_page_bytes(pid)
    }

    fn write_page(&self, pid: &BTreePageID, bytes: &[u8]) -> SmallResult {
        self.write_btree_page_bytes(pid, bytes)
    }

    fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> SmallResult {
        self.insert_tuple(tx, tuple)
    }

    fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> SmallResult {
        self.delete_tuple_by_key(tx, tuple)
    }

    /// Re-looks up the table by id and re-descends from the root on
    /// every `open`/`rewind`, matching `restartable_search`'s rationale:
    /// a cached `BTreeTableIterator` would replay one fixed starting
    /// leaf and its locks instead of re-acquiring them.
    fn iterator<'t>(&self, tx: &'t Transaction) -> Result<Box<dyn DbFileIterator<Item = Tuple> + 't>, SmallError> {
        let table_id = self.get_table_id();
        let factory = move || -> Result<_, SmallError> {
            let table = Database::catalog().get_btree_table(table_id)?;
            let it = table.read().unwrap().iter(tx)?;
            Ok(it.map(|wt| wt.get_tuple().clone()))
        };
        Ok(Box::new(RestartableIter::new(factory)))
    }
}

pub struct BTreeTableIterator<'t> {
    tx: &'t Transaction,
    page: Pod<BTreeLeafPage>,
    buf: Vec<WrappedTuple>,
    buf_pos: usize,
}

impl<'t> BTreeTableIterator<'t> {
    fn new(tx: &'t Transaction, page: Pod<BTreeLeafPage>) -> Self {
        let buf: Vec<WrappedTuple> = BTreeLeafPageIterator::new(&page.rl()).collect();
        Self { tx, page, buf, buf_pos: 0 }
    }
}

impl<'t> Iterator for BTreeTableIterator<'t> {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.buf_pos < self.buf.len() {
                let t = self.buf[self.buf_pos].clone();
                self.buf_pos += 1;
                return Some(t);
            }
            let right = self.page.rl().get_right_pid()?;
            let next_page = Database::buffer_pool()
                .get_leaf_page(self.tx, Permission::ReadOnly, &right)
                .ok()?;
            self.buf = BTreeLeafPageIterator::new(&next_page.rl()).collect();
            self.buf_pos = 0;
            self.page = next_page;
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Op {
    Equals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
}

#[derive(Clone)]
pub struct Predicate {
    pub op: Op,
    pub field: Field,
}

impl Predicate {
    pub fn new(op: Op, field: Field) -> Self {
        Self { op, field }
    }

    pub fn matches(&self, field: &Field) -> bool {
        match self.op {
            Op::Equals => *field == self.field,
            Op::GreaterThan => *field > self.field,
            Op::GreaterThanOrEq => *field >= self.field,
            Op::LessThan => *field < self.field,
            Op::LessThanOrEq => *field <= self.field,
        }
    }
}

pub struct BTreeTableSearchIterator<'t> {
    tx: &'t Transaction,
    page: Pod<BTreeLeafPage>,
    buf: Vec<WrappedTuple>,
    buf_pos: usize,
    predicate: Predicate,
    key_field: usize,
    done: bool,
}

impl<'t> BTreeTableSearchIterator<'t> {
    fn new(tx: &'t Transaction, page: Pod<BTreeLeafPage>, predicate: Predicate, key_field: usize) -> Self {
        let buf: Vec<WrappedTuple> = BTreeLeafPageIterator::new(&page.rl()).collect();
        Self { tx, page, buf, buf_pos: 0, predicate, key_field, done: false }
    }
}

impl<'t> Iterator for BTreeTableSearchIterator<'t> {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.buf_pos >= self.buf.len() {
                let right = self.page.rl().get_right_pid()?;
                let next_page = Database::buffer_pool()
                    .get_leaf_page(self.tx, Permission::ReadOnly, &right)
                    .ok()?;
                self.buf = BTreeLeafPageIterator::new(&next_page.rl()).collect();
                self.buf_pos = 0;
                self.page = next_page;
                continue;
            }

            let t = self.buf[self.buf_pos].clone();
            self.buf_pos += 1;
            let field = t.get_field(self.key_field).clone();
            let matches = self.predicate.matches(&field);
            let past_range = matches!(self.predicate.op, Op::Equals | Op::LessThan | Op::LessThanOrEq)
                && field > self.predicate.field;

            if matches {
                return Some(t);
            }
            if past_range {
                self.done = true;
                return None;
            }
        }
    }
}
