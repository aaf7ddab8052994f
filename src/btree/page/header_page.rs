use bit_vec::BitVec;

use crate::{
    btree::page_id::{BTreePageID, PageCategory, EMPTY_PAGE_ID},
    config::get_page_size,
    error::SmallError,
    transaction::Transaction,
};

use super::{BTreeBasePage, BTreePage};

/// Bitmap page tracking allocated vs. free pages within a B+ tree file,
/// chained via prev/next to cover arbitrarily many pages (spec §3).
/// Bit i set ⇔ the i-th page covered by this header page is allocated.
pub struct BTreeHeaderPage {
    page: BTreeBasePage,
    prev_page_index: u32,
    next_page_index: u32,
    slot_count: usize,
    bitmap: BitVec<u32>,
}

impl std::ops::Deref for BTreeHeaderPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeHeaderPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreeHeaderPage {
    /// `num_slots = (PAGE_SIZE - 8) * 8` (spec §6): 4 bytes prev + 4
    /// bytes next, the rest of the page is bitmap.
    pub fn num_slots() -> usize {
        (get_page_size() - 8) * 8
    }

    pub fn new(pid: &BTreePageID, bytes: &[u8]) -> Result<Self, SmallError> {
        let mut cursor: &[u8] = bytes;
        let mut buf4 = [0u8; 4];

        use std::io::Read;
        cursor.read_exact(&mut buf4)?;
        let prev_page_index = u32::from_be_bytes(buf4);
        cursor.read_exact(&mut buf4)?;
        let next_page_index = u32::from_be_bytes(buf4);

        let slot_count = Self::num_slots();
        let bitmap_bytes = (slot_count + 7) / 8;
        let bitmap = BitVec::from_bytes(&cursor[..bitmap_bytes]);

        Ok(Self {
            page: BTreeBasePage::new(pid),
            prev_page_index,
            next_page_index,
            slot_count,
            bitmap,
        })
    }

    /// A freshly allocated header page: every slot starts free (bit 0),
    /// not the "all allocated" polarity a stale init would imply.
    pub fn empty(pid: &BTreePageID) -> Self {
        let slot_count = Self::num_slots();
        let bitmap_bytes = (slot_count + 7) / 8;
        Self {
            page: BTreeBasePage::new(pid),
            prev_page_index: EMPTY_PAGE_ID,
            next_page_index: EMPTY_PAGE_ID,
            slot_count,
            bitmap: BitVec::from_bytes(&vec![0u8; bitmap_bytes]),
        }
    }

    pub fn get_slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.bitmap[slot]
    }

    pub fn mark_slot_status(&mut self, slot: usize, used: bool) {
        self.bitmap.set(slot, used);
    }

    pub fn get_empty_slot(&self) -> Option<usize> {
        (0..self.slot_count).find(|&i| !self.is_slot_used(i))
    }

    pub fn get_prev_pid(&self) -> Option<BTreePageID> {
        if self.prev_page_index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(
                PageCategory::Header,
                self.page.get_pid().table_id,
                self.prev_page_index,
            ))
        }
    }

    pub fn set_prev_pid(&mut self, pid: Option<BTreePageID>) {
        self.prev_page_index = pid.map(|p| p.page_index).unwrap_or(EMPTY_PAGE_ID);
    }

    pub fn get_next_pid(&self) -> Option<BTreePageID> {
        if self.next_page_index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(
                PageCategory::Header,
                self.page.get_pid().table_id,
                self.next_page_index,
            ))
        }
    }

    pub fn set_next_pid(&mut self, pid: Option<BTreePageID>) {
        self.next_page_index = pid.map(|p| p.page_index).unwrap_or(EMPTY_PAGE_ID);
    }
}

impl BTreePage for BTreeHeaderPage {
    fn get_pid(&self) -> BTreePageID {
        self.page.get_pid()
    }

    fn get_parent_pid(&self) -> BTreePageID {
        panic!("header pages have no parent pointer")
    }

    fn set_parent_pid(&mut self, _pid: &BTreePageID) {
        panic!("header pages have no parent pointer")
    }

    fn get_page_data(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(get_page_size());
        bytes.extend(self.prev_page_index.to_be_bytes());
        bytes.extend(self.next_page_index.to_be_bytes());
        let mut bitmap_bytes = self.bitmap.to_bytes();
        bitmap_bytes.resize((self.slot_count + 7) / 8, 0);
        bytes.extend(bitmap_bytes);
        bytes.resize(get_page_size(), 0);
        bytes
    }

    fn is_dirty(&self) -> Option<Transaction> {
        self.page.is_dirty()
    }

    fn mark_dirty(&mut self, dirty: bool, tid: Transaction) {
        self.page.mark_dirty(dirty, tid)
    }
}
