use std::io::Read;

use crate::{
    btree::page_id::{BTreePageID, PageCategory, EMPTY_PAGE_ID},
    error::SmallError,
    transaction::Transaction,
};

use super::{BTreeBasePage, BTreePage};

/// `root_page_no (4B) + root_category (1B) + first_header_page_no (4B)` =
/// 9 bytes total (spec §6).
pub const ROOT_PTR_SIZE: usize = 9;

/// Singleton page at byte 0 of every B+ tree file: the current root's id
/// and the head of the free-page header chain (spec §3).
pub struct BTreeRootPointerPage {
    base: BTreeBasePage,
    root_page_index: u32,
    root_category: PageCategory,
    header_page_index: u32,
}

impl BTreeRootPointerPage {
    pub fn new(table_id: u32, bytes: &[u8]) -> Result<Self, SmallError> {
        let pid = BTreePageID::root_ptr(table_id);
        let mut cursor: &[u8] = bytes;

        let mut buf4 = [0u8; 4];
        cursor.read_exact(&mut buf4)?;
        let root_page_index = u32::from_be_bytes(buf4);

        let mut buf1 = [0u8; 1];
        cursor.read_exact(&mut buf1)?;
        let root_category = match buf1[0] {
            0 => PageCategory::RootPointer, // sentinel: no root yet
            1 => PageCategory::Internal,
            2 => PageCategory::Leaf,
            other => return Err(SmallError::illegal_page(&format!("bad root category {}", other))),
        };

        cursor.read_exact(&mut buf4)?;
        let header_page_index = u32::from_be_bytes(buf4);

        Ok(Self {
            base: BTreeBasePage::new(&pid),
            root_page_index,
            root_category,
            header_page_index,
        })
    }

    pub fn empty(table_id: u32) -> Self {
        let pid = BTreePageID::root_ptr(table_id);
        Self {
            base: BTreeBasePage::new(&pid),
            root_page_index: EMPTY_PAGE_ID,
            root_category: PageCategory::RootPointer,
            header_page_index: EMPTY_PAGE_ID,
        }
    }

    pub fn get_root_pid(&self) -> Option<BTreePageID> {
        if self.root_page_index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(
                self.root_category,
                self.base.get_pid().table_id,
                self.root_page_index,
            ))
        }
    }

    pub fn set_root_pid(&mut self, pid: &BTreePageID) {
        self.root_page_index = pid.page_index;
        self.root_category = pid.category;
    }

    pub fn get_header_pid(&self) -> Option<BTreePageID> {
        if self.header_page_index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(
                crate::btree::page_id::PageCategory::Header,
                self.base.get_pid().table_id,
                self.header_page_index,
            ))
        }
    }

    pub fn set_header_pid(&mut self, pid: Option<BTreePageID>) {
        self.header_page_index = pid.map(|p| p.page_index).unwrap_or(EMPTY_PAGE_ID);
    }
}

impl BTreePage for BTreeRootPointerPage {
    fn get_pid(&self) -> BTreePageID {
        self.base.get_pid()
    }

    fn get_parent_pid(&self) -> BTreePageID {
        panic!("the root-ptr page has no parent")
    }

    fn set_parent_pid(&mut self, _pid: &BTreePageID) {
        panic!("the root-ptr page has no parent")
    }

    fn get_page_data(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ROOT_PTR_SIZE);
        bytes.extend(self.root_page_index.to_be_bytes());
        let cat_byte = match self.root_category {
            PageCategory::RootPointer => 0u8,
            PageCategory::Internal => 1u8,
            PageCategory::Leaf => 2u8,
            PageCategory::Header => panic!("root cannot be a header page"),
        };
        bytes.push(cat_byte);
        bytes.extend(self.header_page_index.to_be_bytes());
        bytes
    }

    fn is_dirty(&self) -> Option<Transaction> {
        self.base.is_dirty()
    }

    fn mark_dirty(&mut self, dirty: bool, tid: Transaction) {
        self.base.mark_dirty(dirty, tid)
    }
}
