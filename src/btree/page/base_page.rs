use crate::{
    btree::page_id::{BTreePageID, PageCategory, EMPTY_PAGE_ID},
    transaction::Transaction,
};

/// Fields common to every B+ tree page category: its own id, its
/// parent's page index (stored as a bare index, not a full id — the
/// parent is always either the root-ptr page or an internal page, never
/// a header page, so the category can be inferred; see `get_parent_pid`).
///
/// The parent pointer is a *weak* reference (spec §9): resolving it
/// produces a `BTreePageID`, never a cached page handle, so split/merge
/// can rewrite it freely without invalidating anything held elsewhere.
pub struct BTreeBasePage {
    pid: BTreePageID,
    parent_page_index: u32,
    dirty: Option<Transaction>,
}

impl BTreeBasePage {
    pub fn new(pid: &BTreePageID) -> Self {
        Self {
            pid: pid.clone(),
            parent_page_index: EMPTY_PAGE_ID,
            dirty: None,
        }
    }

    pub fn get_pid(&self) -> BTreePageID {
        self.pid.clone()
    }

    pub fn get_parent_pid(&self) -> BTreePageID {
        if self.parent_page_index == EMPTY_PAGE_ID {
            BTreePageID::new(PageCategory::RootPointer, self.pid.table_id, 0)
        } else {
            BTreePageID::new(PageCategory::Internal, self.pid.table_id, self.parent_page_index)
        }
    }

    pub fn set_parent_pid(&mut self, pid: &BTreePageID) {
        match pid.category {
            PageCategory::RootPointer => self.parent_page_index = EMPTY_PAGE_ID,
            PageCategory::Internal => self.parent_page_index = pid.page_index,
            _ => panic!("a page's parent can only be the root-ptr page or an internal page"),
        }
    }

    pub fn is_dirty(&self) -> Option<Transaction> {
        self.dirty
    }

    pub fn mark_dirty(&mut self, dirty: bool, tid: Transaction) {
        self.dirty = if dirty { Some(tid) } else { None };
    }
}
