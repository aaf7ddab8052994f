use std::fmt;

use crate::{btree::page_id::BTreePageID, page_id::PageId};

/// Unifies heap-file and B+ tree page identities into a single key type
/// for the lock manager and page cache, which otherwise don't care which
/// kind of `DbFile` a page belongs to.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum PageKey {
    Heap(PageId),
    BTree(BTreePageID),
}

impl From<PageId> for PageKey {
    fn from(p: PageId) -> Self {
        PageKey::Heap(p)
    }
}

impl From<BTreePageID> for PageKey {
    fn from(p: BTreePageID) -> Self {
        PageKey::BTree(p)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PageKey::Heap(p) => write!(f, "{}", p),
            PageKey::BTree(p) => write!(f, "{}", p),
        }
    }
}
