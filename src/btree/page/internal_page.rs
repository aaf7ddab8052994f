use bit_vec::BitVec;

use crate::{
    btree::page_id::{BTreePageID, PageCategory, EMPTY_PAGE_ID},
    config::{get_page_size, INDEX_SIZE},
    error::SmallError,
    field::Field,
    transaction::Transaction,
    tuple::TupleDesc,
};

use super::{BTreeBasePage, BTreePage};

/// One `(key, left child, right child)` triple inside an internal page,
/// plus the slot it currently occupies (its "record id" within the
/// page, used to address it for update/delete).
#[derive(Clone, Debug)]
pub struct Entry {
    key: Field,
    left: BTreePageID,
    right: BTreePageID,
    record_id: usize,
}

impl Entry {
    pub fn new(key: &Field, left: &BTreePageID, right: &BTreePageID) -> Self {
        Self {
            key: key.clone(),
            left: left.clone(),
            right: right.clone(),
            record_id: usize::MAX,
        }
    }

    pub fn get_key(&self) -> Field {
        self.key.clone()
    }

    pub fn set_key(&mut self, key: Field) {
        self.key = key;
    }

    pub fn get_left_child(&self) -> BTreePageID {
        self.left.clone()
    }

    pub fn get_right_child(&self) -> BTreePageID {
        self.right.clone()
    }

    pub fn get_record_id(&self) -> usize {
        self.record_id
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "<{} | {} -> {}>", self.left, self.key, self.right)
    }
}

/// Internal (non-leaf) B+ tree page: bitmap header + alternating
/// child-pointer/key entries + a shared child-category tag + parent
/// pointer (spec §3). Logically `m` keys and `m+1` child pointers; the
/// left child of the n-th entry is not always the (n-1)-th slot, but the
/// nearest left slot marked used.
pub struct BTreeInternalPage {
    page: BTreeBasePage,
    keys: Vec<Field>,
    children: Vec<u32>,
    child_category: PageCategory,
    slot_count: usize,
    header: BitVec<u32>,
    pub scheme: TupleDesc,
    key_field: usize,
}

impl std::ops::Deref for BTreeInternalPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeInternalPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreeInternalPage {
    pub fn get_max_entries(key_size: usize) -> usize {
        let bits_per_entry = key_size * 8 + INDEX_SIZE * 8 + 1;
        // parent pointer + one extra child pointer + 1 byte child-category tag.
        let extra_bits = 2 * INDEX_SIZE * 8 + 8;
        (get_page_size() * 8 - extra_bits) / bits_per_entry
    }

    pub fn get_header_size(slot_count: usize) -> usize {
        (slot_count + 7) / 8
    }

    pub fn new(
        pid: &BTreePageID,
        bytes: &[u8],
        scheme: &TupleDesc,
        key_field: usize,
    ) -> Result<Self, SmallError> {
        let key_size = scheme.get_field_type(key_field).len();
        let max_entries = Self::get_max_entries(key_size);
        let slot_count = max_entries + 1;
        let header_size = Self::get_header_size(slot_count);

        use std::io::Read;
        let mut cursor: &[u8] = bytes;
        let mut buf4 = [0u8; 4];
        cursor.read_exact(&mut buf4)?;
        let parent_index = u32::from_be_bytes(buf4);

        let mut buf1 = [0u8; 1];
        cursor.read_exact(&mut buf1)?;
        let child_category = match buf1[0] {
            1 => PageCategory::Internal,
            2 => PageCategory::Leaf,
            _ => PageCategory::Leaf, // freshly allocated page: no children yet
        };

        let header = BitVec::from_bytes(&cursor[..header_size]);
        cursor = &cursor[header_size..];

        let mut keys = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            keys.push(Field::decode(&mut cursor, scheme.get_field_type(key_field))?);
        }
        let mut children = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            children.push(u32::decode(&mut cursor)?);
        }

        let mut page = BTreeBasePage::new(pid);
        if parent_index == EMPTY_PAGE_ID {
            page.set_parent_pid(&BTreePageID::root_ptr(pid.table_id));
        } else {
            page.set_parent_pid(&BTreePageID::new(PageCategory::Internal, pid.table_id, parent_index));
        }

        Ok(Self {
            page,
            keys,
            children,
            child_category,
            slot_count,
            header,
            scheme: scheme.clone(),
            key_field,
        })
    }

    pub fn get_child_category(&self) -> PageCategory {
        self.child_category
    }

    pub fn set_child_category(&mut self, cat: PageCategory) {
        self.child_category = cat;
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header[slot]
    }

    fn mark_slot_status(&mut self, slot: usize, used: bool) {
        self.header.set(slot, used);
    }

    fn child_pid(&self, slot: usize) -> BTreePageID {
        BTreePageID::new(self.child_category, self.get_pid().table_id, self.children[slot])
    }

    pub fn get_entry(&self, slot: usize) -> Option<Entry> {
        if slot == 0 || !self.is_slot_used(slot) {
            return None;
        }
        let left_slot = (0..slot).rev().find(|&i| self.is_slot_used(i))?;
        Some(Entry {
            key: self.keys[slot].clone(),
            left: self.child_pid(left_slot),
            right: self.child_pid(slot),
            record_id: slot,
        })
    }

    /// Number of logically present entries: `m` keys for `m+1` used
    /// child slots, i.e. used-slot-count minus 1 (slot 0 is always the
    /// leftmost child and never carries its own entry).
    pub fn entries_count(&self) -> usize {
        let used = (0..self.slot_count).filter(|&i| self.is_slot_used(i)).count();
        used.saturating_sub(1)
    }

    pub fn empty_slots_count(&self) -> usize {
        // slot 0, once used, never frees independently of the rest; we
        // count from slot 1 since a brand-new page with zero entries
        // still has slot 0 unused.
        (0..self.slot_count).filter(|&i| !self.is_slot_used(i)).count()
    }

    /// At-least-half-full check (the inverse of a leaf's `should_merge`):
    /// true if this page is the root, or has fewer than half its
    /// capacity in empty slots.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        let max_empty = self.slot_count - self.slot_count / 2;
        self.empty_slots_count() <= max_empty
    }

    pub fn get_max_empty_slots(&self) -> usize {
        self.slot_count - self.slot_count / 2
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    pub fn get_key_field(&self) -> usize {
        self.key_field
    }

    /// First insertion on an empty page sets up slot 0 (left child only)
    /// directly; afterwards finds the empty slot adjoining whichever
    /// existing entry matches one side of the new entry and shifts into
    /// place, preserving "nearest-left-used-slot owns the left child".
    pub fn insert_entry(&mut self, e: &Entry) -> Result<(), SmallError> {
        if self.entries_count() == 0 {
            self.children[0] = e.left.page_index;
            self.children[1] = e.right.page_index;
            self.keys[1] = e.key.clone();
            self.mark_slot_status(0, true);
            self.mark_slot_status(1, true);
            return Ok(());
        }

        let empty_slot = (1..self.slot_count)
            .find(|&i| !self.is_slot_used(i))
            .ok_or_else(|| SmallError::no_space("internal page has no empty slot"))?;

        let mut anchor: Option<usize> = None;
        for i in 1..self.slot_count {
            if !self.is_slot_used(i) {
                continue;
            }
            let entry = self.get_entry(i).unwrap();
            if entry.left == e.left || entry.right == e.left {
                anchor = Some(i);
                break;
            }
            if entry.left == e.right || entry.right == e.right {
                anchor = Some(if i == 0 { i } else { i - 1 });
                break;
            }
        }

        let slot_just_ahead = anchor
            .ok_or_else(|| SmallError::not_found("no adjoining slot found for new entry"))?;

        if empty_slot < slot_just_ahead {
            for i in empty_slot..slot_just_ahead {
                self.move_entry(i + 1, i);
            }
        } else {
            for i in (slot_just_ahead + 1..empty_slot).rev() {
                self.move_entry(i, i + 1);
            }
        }

        let dest = if empty_slot < slot_just_ahead { slot_just_ahead } else { slot_just_ahead + 1 };
        self.keys[dest] = e.key.clone();
        self.children[dest] = e.right.page_index;
        self.mark_slot_status(dest, true);
        Ok(())
    }

    fn move_entry(&mut self, from: usize, to: usize) {
        if !self.is_slot_used(from) {
            return;
        }
        self.keys[to] = self.keys[from].clone();
        self.children[to] = self.children[from];
        self.mark_slot_status(to, true);
        self.mark_slot_status(from, false);
    }

    /// Deletes the entry at `slot`, along with its right child pointer —
    /// used when merging/draining entries where the left child survives
    /// on the receiving page.
    pub fn delete_key_and_right_child(&mut self, slot: usize) {
        self.mark_slot_status(slot, false);
    }

    /// Deletes the entry at `slot` along with its *left* child: the
    /// nearest used slot to the left inherits this entry's left child
    /// pointer (so the remaining chain of children stays unbroken).
    pub fn delete_key_and_left_child(&mut self, slot: usize) {
        if let Some(prev) = (0..slot).rev().find(|&i| self.is_slot_used(i)) {
            self.children[prev] = self.children[slot];
        }
        self.mark_slot_status(slot, false);
    }

    pub fn update_entry(&mut self, e: &Entry) {
        let slot = e.record_id;
        self.keys[slot] = e.key.clone();
        let left_slot = (0..slot).rev().find(|&i| self.is_slot_used(i));
        if let Some(ls) = left_slot {
            self.children[ls] = e.left.page_index;
        }
        self.children[slot] = e.right.page_index;
    }

    pub fn get_first_child_pid(&self) -> Option<BTreePageID> {
        BTreeInternalPageIterator::new(self).next().map(|e| e.get_left_child())
    }

    pub fn get_last_child_pid(&self) -> Option<BTreePageID> {
        BTreeInternalPageIterator::new(self).next_back().map(|e| e.get_right_child())
    }

    /// Find the entry connecting two known sibling children, used when
    /// merging/redistributing a pair of pages that share a parent.
    pub fn get_entry_by_children(&self, left: &BTreePageID, right: &BTreePageID) -> Option<Entry> {
        BTreeInternalPageIterator::new(self).find(|e| &e.left == left && &e.right == right)
    }

    pub fn check_integrity(
        &self,
        parent_pid: &BTreePageID,
        lower_bound: Option<Field>,
        upper_bound: Option<Field>,
        check_occupancy: bool,
        depth: usize,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Internal);
        assert_eq!(&self.get_parent_pid(), parent_pid);

        let mut previous = lower_bound;
        for e in BTreeInternalPageIterator::new(self) {
            if let Some(p) = &previous {
                assert!(*p <= e.get_key());
            }
            previous = Some(e.get_key());
        }
        if let (Some(upper), Some(p)) = (upper_bound, previous) {
            assert!(p <= upper);
        }

        if check_occupancy && depth > 0 {
            let key_size = self.scheme.get_field_type(self.key_field).len();
            let min = Self::get_max_entries(key_size) / 2;
            assert!(self.entries_count() >= min.saturating_sub(1));
        }
    }
}

impl BTreePage for BTreeInternalPage {
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
        let cat_byte = match self.child_category {
            PageCategory::Internal => 1u8,
            PageCategory::Leaf => 2u8,
            _ => 0u8,
        };
        bytes.push(cat_byte);

        let header_size = Self::get_header_size(self.slot_count);
        let mut header_bytes = self.header.to_bytes();
        header_bytes.resize(header_size, 0);
        bytes.extend(header_bytes);

        use crate::io::{Encodeable, SmallWriter};
        let mut w = SmallWriter::new();
        for k in &self.keys {
            w.write(k);
        }
        for c in &self.children {
            w.write(c);
        }
        bytes.extend(w.to_bytes());
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

use crate::io::Decodeable;

pub struct BTreeInternalPageIterator<'page> {
    page: &'page BTreeInternalPage,
    cursor: usize,
    reverse_cursor: usize,
}

impl<'page> BTreeInternalPageIterator<'page> {
    pub fn new(page: &'page BTreeInternalPage) -> Self {
        Self {
            page,
            cursor: 0,
            reverse_cursor: page.slot_count,
        }
    }
}

impl<'page> Iterator for BTreeInternalPageIterator<'page> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor + 1 < self.reverse_cursor {
            self.cursor += 1;
            if let Some(e) = self.page.get_entry(self.cursor) {
                return Some(e);
            }
        }
        None
    }
}

impl<'page> DoubleEndedIterator for BTreeInternalPageIterator<'page> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while self.reverse_cursor > self.cursor + 1 {
            let slot = self.reverse_cursor - 1;
            self.reverse_cursor -= 1;
            if let Some(e) = self.page.get_entry(slot) {
                return Some(e);
            }
        }
        None
    }
}
