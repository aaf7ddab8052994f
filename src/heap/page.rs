use bit_vec::BitVec;

use crate::{
    config::get_page_size,
    error::SmallError,
    page_id::{PageId, RecordId},
    transaction::Transaction,
    tuple::{Tuple, TupleDesc},
};

/// A slotted page: a bitmap header (one bit per slot, 1 = occupied)
/// followed by contiguous fixed-width tuple slots (spec §3/§4.1).
pub struct HeapPage {
    pid: PageId,
    scheme: TupleDesc,
    slot_count: usize,
    header: BitVec<u32>,
    tuples: Vec<Tuple>,
    dirty: Option<Transaction>,
    old_data: Vec<u8>,
}

impl HeapPage {
    pub fn new(pid: PageId, bytes: &[u8], scheme: &TupleDesc) -> Result<Self, SmallError> {
        let slot_count = Self::calculate_slot_count(scheme);
        let header_size = Self::calculate_header_size(slot_count);

        let header = BitVec::from_bytes(&bytes[..header_size]);
        let mut tuples = Vec::with_capacity(slot_count);
        let tuple_size = scheme.get_size();
        for i in 0..slot_count {
            let start = header_size + i * tuple_size;
            let end = start + tuple_size;
            let mut t = Tuple::from_bytes(scheme, &bytes[start..end])?;
            t.record_id = Some(RecordId::new(pid, i));
            tuples.push(t);
        }

        Ok(Self {
            pid,
            scheme: scheme.clone(),
            slot_count,
            header,
            tuples,
            dirty: None,
            old_data: bytes.to_vec(),
        })
    }

    pub fn empty_page_data() -> Vec<u8> {
        vec![0u8; get_page_size()]
    }

    /// `slots_per_page = floor((PAGE_SIZE * 8) / (tuple_bits + 1))`.
    pub fn calculate_slot_count(scheme: &TupleDesc) -> usize {
        let tuple_bits = scheme.get_size() * 8;
        (get_page_size() * 8) / (tuple_bits + 1)
    }

    pub fn calculate_header_size(slot_count: usize) -> usize {
        (slot_count + 7) / 8
    }

    pub fn get_pid(&self) -> PageId {
        self.pid
    }

    pub fn get_num_empty_slots(&self) -> usize {
        (0..self.slot_count).filter(|&i| !self.is_slot_used(i)).count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header[slot]
    }

    fn mark_slot(&mut self, slot: usize, used: bool) {
        self.header.set(slot, used);
    }

    /// Find the lowest-numbered empty slot, stamp the tuple's bytes into
    /// it, set its bit, and stamp `t.record_id`. Fails `NoSpace` if full,
    /// `SchemaMismatch` if descriptors differ.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<(), SmallError> {
        if tuple.scheme != self.scheme {
            return Err(SmallError::schema_mismatch(
                "tuple descriptor does not match page",
            ));
        }
        let slot = (0..self.slot_count)
            .find(|&i| !self.is_slot_used(i))
            .ok_or_else(|| SmallError::no_space("heap page has no empty slot"))?;

        let mut stored = tuple.clone();
        stored.record_id = Some(RecordId::new(self.pid, slot));
        self.tuples[slot] = stored;
        self.mark_slot(slot, true);
        Ok(())
    }

    /// Requires `t.record_id.page_id == pid` and the slot to be
    /// currently occupied; clears the bit. Fails `NotFound` otherwise.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<(), SmallError> {
        let rid = tuple
            .record_id
            .ok_or_else(|| SmallError::not_found("tuple has no record id"))?;
        if rid.page_id != self.pid {
            return Err(SmallError::not_found("tuple does not belong to this page"));
        }
        if !self.is_slot_used(rid.slot_no) {
            return Err(SmallError::not_found("slot is already empty"));
        }
        self.mark_slot(rid.slot_no, false);
        Ok(())
    }

    pub fn get_tuple(&self, slot: usize) -> Option<&Tuple> {
        if self.is_slot_used(slot) {
            Some(&self.tuples[slot])
        } else {
            None
        }
    }

    pub fn iter(&self) -> HeapPageIterator<'_> {
        HeapPageIterator {
            page: self,
            cursor: 0,
        }
    }

    pub fn is_dirty(&self) -> Option<Transaction> {
        self.dirty
    }

    pub fn mark_dirty(&mut self, dirty: bool, tid: Transaction) {
        self.dirty = if dirty { Some(tid) } else { None };
    }

    /// Snapshot of this page's bytes as they were the moment it was
    /// last read from disk or marked clean — used by `NO-STEAL` abort
    /// handling in the buffer pool.
    pub fn get_before_image(&self) -> Vec<u8> {
        self.old_data.clone()
    }

    pub fn set_before_image(&mut self) {
        self.old_data = self.get_page_data();
    }

    pub fn get_page_data(&self) -> Vec<u8> {
        let header_size = Self::calculate_header_size(self.slot_count);
        let mut bytes = self.header.to_bytes();
        bytes.resize(header_size, 0);
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
}

pub struct HeapPageIterator<'page> {
    page: &'page HeapPage,
    cursor: usize,
}

impl<'page> Iterator for HeapPageIterator<'page> {
    type Item = &'page Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.page.slot_count {
            let i = self.cursor;
            self.cursor += 1;
            if self.page.is_slot_used(i) {
                return Some(&self.page.tuples[i]);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{int_tuple, int_tuple_desc};

    #[test]
    fn insert_delete_roundtrip_through_page_bytes() {
        let scheme = int_tuple_desc(2);
        let pid = PageId::new(7, 0);
        let mut page = HeapPage::new(pid, &HeapPage::empty_page_data(), &scheme).unwrap();

        let total_slots = page.slot_count;
        assert_eq!(page.get_num_empty_slots(), total_slots);

        page.insert_tuple(&int_tuple(&[1, 100])).unwrap();
        page.insert_tuple(&int_tuple(&[2, 200])).unwrap();
        assert_eq!(page.get_num_empty_slots(), total_slots - 2);

        let bytes = page.get_page_data();
        let reloaded = HeapPage::new(pid, &bytes, &scheme).unwrap();
        let values: Vec<i32> = reloaded
            .iter()
            .map(|t| match t.get_field(1) {
                crate::field::Field::Int(v) => v.value,
                _ => panic!("expected int"),
            })
            .collect();
        assert_eq!(values, vec![100, 200]);

        let first = page.get_tuple(0).unwrap().clone();
        page.delete_tuple(&first).unwrap();
        assert_eq!(page.get_num_empty_slots(), total_slots - 1);
        assert!(page.delete_tuple(&first).is_err());
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let scheme = int_tuple_desc(2);
        let pid = PageId::new(1, 0);
        let mut page = HeapPage::new(pid, &HeapPage::empty_page_data(), &scheme).unwrap();
        let wrong = int_tuple(&[1, 2, 3]);
        assert!(page.insert_tuple(&wrong).is_err());
    }
}
