use bit_vec::BitVec;
use log::debug;

use crate::{
    btree::page_id::{BTreePageID, PageCategory, EMPTY_PAGE_ID},
    config::{get_page_size, INDEX_SIZE},
    error::SmallError,
    transaction::Transaction,
    tuple::{decode_tuple, Tuple, TupleDesc, WrappedTuple},
};

use super::{BTreeBasePage, BTreePage};

/// Sorted-by-key leaf page: bitmap header + tuple slots + left/right
/// sibling pointers + parent pointer (spec §3). All slots (occupied or
/// not) are parsed eagerly; occupancy is tracked by `header`.
pub struct BTreeLeafPage {
    page: BTreeBasePage,
    pub slot_count: usize,
    header: BitVec<u32>,
    tuples: Vec<Tuple>,
    pub scheme: TupleDesc,
    right_sibling_index: u32,
    left_sibling_index: u32,
    key_field: usize,
}

impl std::ops::Deref for BTreeLeafPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeLeafPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreeLeafPage {
    pub fn new(
        pid: &BTreePageID,
        bytes: &[u8],
        scheme: &TupleDesc,
        key_field: usize,
    ) -> Result<Self, SmallError> {
        let slot_count = Self::calculate_slots_count(scheme);
        let header_size = Self::calculate_header_size(slot_count);

        let mut cursor: &[u8] = bytes;
        use std::io::Read;
        let mut buf4 = [0u8; 4];
        cursor.read_exact(&mut buf4)?;
        let parent_index = u32::from_be_bytes(buf4);
        cursor.read_exact(&mut buf4)?;
        let left_sibling_index = u32::from_be_bytes(buf4);
        cursor.read_exact(&mut buf4)?;
        let right_sibling_index = u32::from_be_bytes(buf4);

        let header = BitVec::from_bytes(&cursor[..header_size]);
        cursor = &cursor[header_size..];

        let mut tuples = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            tuples.push(decode_tuple(&mut cursor, scheme)?);
        }

        let mut page = BTreeBasePage::new(pid);
        if parent_index == EMPTY_PAGE_ID {
            page.set_parent_pid(&BTreePageID::root_ptr(pid.table_id));
        } else {
            page.set_parent_pid(&BTreePageID::new(PageCategory::Internal, pid.table_id, parent_index));
        }

        Ok(Self {
            page,
            slot_count,
            header,
            tuples,
            scheme: scheme.clone(),
            right_sibling_index,
            left_sibling_index,
            key_field,
        })
    }

    pub fn set_right_pid(&mut self, pid: Option<BTreePageID>) {
        self.right_sibling_index = pid.map(|p| p.page_index).unwrap_or(EMPTY_PAGE_ID);
    }

    pub fn get_right_pid(&self) -> Option<BTreePageID> {
        if self.right_sibling_index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(PageCategory::Leaf, self.get_pid().table_id, self.right_sibling_index))
        }
    }

    pub fn set_left_pid(&mut self, pid: Option<BTreePageID>) {
        self.left_sibling_index = pid.map(|p| p.page_index).unwrap_or(EMPTY_PAGE_ID);
    }

    pub fn get_left_pid(&self) -> Option<BTreePageID> {
        if self.left_sibling_index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(PageCategory::Leaf, self.get_pid().table_id, self.left_sibling_index))
        }
    }

    /// Maximum number of tuples this page can hold: the three
    /// sibling/parent pointers eat `3 * INDEX_SIZE * 8` bits up front,
    /// each remaining slot costs `tuple_bits + 1` (data + header bit).
    pub fn calculate_slots_count(scheme: &TupleDesc) -> usize {
        let bits_per_tuple_including_header = scheme.get_size() * 8 + 1;
        let extra_bits = 3 * INDEX_SIZE * 8;
        (get_page_size() * 8 - extra_bits) / bits_per_tuple_including_header
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    pub fn calculate_header_size(slot_count: usize) -> usize {
        (slot_count + 7) / 8
    }

    /// False if this leaf *is* the root (no merge target exists); else
    /// true once more than half its slots are empty.
    pub fn should_merge(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return false;
        }
        let max_empty_slots = self.slot_count - self.slot_count / 2;
        self.empty_slots_count() > max_empty_slots
    }

    pub fn empty_slots_count(&self) -> usize {
        (0..self.slot_count).filter(|&i| !self.is_slot_used(i)).count()
    }

    pub fn tuples_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    /// Adds `tuple` keeping all records in sorted key order; stamps its
    /// slot back into the returned record-id via the caller's iterator.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<(), SmallError> {
        if tuple.scheme != self.scheme {
            return Err(SmallError::schema_mismatch("tuple does not match leaf page scheme"));
        }

        let mut first_empty_slot: i32 = -1;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                first_empty_slot = i as i32;
                break;
            }
        }
        if first_empty_slot == -1 {
            return Err(SmallError::no_space("leaf page has no empty slot"));
        }

        let key = tuple.get_field(self.key_field);
        let mut last_less_slot: i32 = -1;
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                if self.tuples[i].get_field(self.key_field) < key {
                    last_less_slot = i as i32;
                } else {
                    break;
                }
            }
        }

        let good_slot: usize;
        if first_empty_slot < last_less_slot {
            for i in first_empty_slot..last_less_slot {
                self.move_tuple((i + 1) as usize, i as usize);
            }
            good_slot = last_less_slot as usize;
        } else {
            for i in (last_less_slot + 1..first_empty_slot).rev() {
                self.move_tuple(i as usize, (i + 1) as usize);
            }
            good_slot = (last_less_slot + 1) as usize;
        }

        self.tuples[good_slot] = tuple.clone();
        self.mark_slot_status(good_slot, true);
        debug!("leaf {}: inserted at slot {}", self.get_pid(), good_slot);
        Ok(())
    }

    fn move_tuple(&mut self, from: usize, to: usize) {
        if !self.is_slot_used(from) {
            return;
        }
        self.tuples[to] = self.tuples[from].clone();
        self.mark_slot_status(to, true);
        self.mark_slot_status(from, false);
    }

    pub fn get_tuple(&self, slot: usize) -> Option<Tuple> {
        if self.is_slot_used(slot) {
            Some(self.tuples[slot].clone())
        } else {
            None
        }
    }

    pub fn delete_tuple(&mut self, slot: usize) {
        self.mark_slot_status(slot, false);
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header[slot]
    }

    pub fn mark_slot_status(&mut self, slot: usize, used: bool) {
        self.header.set(slot, used);
    }

    pub fn get_key_field(&self) -> usize {
        self.key_field
    }

    pub fn check_integrity(
        &self,
        parent_pid: &BTreePageID,
        lower_bound: Option<crate::field::Field>,
        upper_bound: Option<crate::field::Field>,
        check_occupancy: bool,
        depth: usize,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Leaf);
        assert_eq!(&self.get_parent_pid(), parent_pid);

        let mut previous = lower_bound;
        for tuple in BTreeLeafPageIterator::new(self) {
            if let Some(p) = &previous {
                assert!(p <= tuple.get_field(self.key_field));
            }
            previous = Some(tuple.get_field(self.key_field).clone());
        }
        if let (Some(upper), Some(p)) = (upper_bound, previous) {
            assert!(p <= upper);
        }

        if check_occupancy && depth > 0 {
            assert!(self.tuples_count() >= self.get_slots_count() / 2);
        }
    }
}

impl BTreePage for BTreeLeafPage {
    fn get_pid(&self) -> BTreePageID {
        self.page.get_pid()
    }

    fn get_parent_pid(&self) -> BTreePageID {
        self.page.get_parent_pid()
    }

    fn set_parent_pid(&mut self, pid: &BTreePageID) {
        self.page.set_parent_pid(pid)
    }

    fn get_page_data(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(get_page_size());
        let parent = self.get_parent_pid();
        let parent_index = if parent.category == PageCategory::RootPointer {
            EMPTY_PAGE_ID
        } else {
            parent.page_index
        };
        bytes.extend(parent_index.to_be_bytes());
        bytes.extend(self.left_sibling_index.to_be_bytes());
        bytes.extend(self.right_sibling_index.to_be_bytes());

        let header_size = Self::calculate_header_size(self.slot_count);
        let mut header_bytes = self.header.to_bytes();
        header_bytes.resize(header_size, 0);
        bytes.extend(header_bytes);

        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                bytes.extend(self.tuples[i].to_bytes());
            } else {
                bytes.extend(vec![0u8; self.scheme.get_size()]);
            }
        }
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

pub struct BTreeLeafPageIterator<'page> {
    page: &'page BTreeLeafPage,
    cursor: i32,
    reverse_cursor: i32,
}

impl<'page> BTreeLeafPageIterator<'page> {
    pub fn new(page: &'page BTreeLeafPage) -> Self {
        Self {
            page,
            cursor: -1,
            reverse_cursor: page.slot_count as i32,
        }
    }
}

impl<'page> Iterator for BTreeLeafPageIterator<'page> {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page;
        loop {
            self.cursor += 1;
            let cursor = self.cursor as usize;
            if cursor >= page.slot_count {
                return None;
            }
            if page.is_slot_used(cursor) {
                return Some(WrappedTuple::new(page.tuples[cursor].clone(), cursor, page.get_pid()));
            }
        }
    }
}

impl<'page> DoubleEndedIterator for BTreeLeafPageIterator<'page> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let page = self.page;
        loop {
            self.reverse_cursor -= 1;
            if self.reverse_cursor < 0 {
                return None;
            }
            let cursor = self.reverse_cursor as usize;
            if page.is_slot_used(cursor) {
                return Some(WrappedTuple::new(page.tuples[cursor].clone(), cursor, page.get_pid()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::int_tuple;

    fn empty_leaf(scheme: &TupleDesc) -> BTreeLeafPage {
        let pid = BTreePageID::new(PageCategory::Leaf, 3, 1);
        let mut bytes = vec![0u8; get_page_size()];
        bytes[0..4].copy_from_slice(&EMPTY_PAGE_ID.to_be_bytes());
        bytes[4..8].copy_from_slice(&EMPTY_PAGE_ID.to_be_bytes());
        bytes[8..12].copy_from_slice(&EMPTY_PAGE_ID.to_be_bytes());
        BTreeLeafPage::new(&pid, &bytes, scheme, 0).unwrap()
    }

    #[test]
    fn inserts_stay_sorted_by_key_and_survive_encode_decode() {
        let scheme = crate::test_utils::int_tuple_desc(1);
        let mut page = empty_leaf(&scheme);

        page.insert_tuple(&int_tuple(&[5])).unwrap();
        page.insert_tuple(&int_tuple(&[1])).unwrap();
        page.insert_tuple(&int_tuple(&[3])).unwrap();

        let keys: Vec<i32> = BTreeLeafPageIterator::new(&page)
            .map(|t| match t.get_field(0) {
                crate::field::Field::Int(v) => v.value,
                _ => panic!("expected int"),
            })
            .collect();
        assert_eq!(keys, vec![1, 3, 5]);

        let bytes = page.get_page_data();
        let pid = page.get_pid();
        let reloaded = BTreeLeafPage::new(&pid, &bytes, &scheme, 0).unwrap();
        let reloaded_keys: Vec<i32> = BTreeLeafPageIterator::new(&reloaded)
            .map(|t| match t.get_field(0) {
                crate::field::Field::Int(v) => v.value,
                _ => panic!("expected int"),
            })
            .collect();
        assert_eq!(reloaded_keys, vec![1, 3, 5]);
        assert_eq!(reloaded.tuples_count(), 3);
    }

    #[test]
    fn sibling_pointers_round_trip_through_bytes() {
        let scheme = crate::test_utils::int_tuple_desc(1);
        let mut page = empty_leaf(&scheme);
        let left = BTreePageID::new(PageCategory::Leaf, 3, 2);
        let right = BTreePageID::new(PageCategory::Leaf, 3, 4);
        page.set_left_pid(Some(left.clone()));
        page.set_right_pid(Some(right.clone()));

        let bytes = page.get_page_data();
        let pid = page.get_pid();
        let reloaded = BTreeLeafPage::new(&pid, &bytes, &scheme, 0).unwrap();
        assert_eq!(reloaded.get_left_pid(), Some(left));
        assert_eq!(reloaded.get_right_pid(), Some(right));
    }
}
