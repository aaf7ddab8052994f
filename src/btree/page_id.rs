use std::{
    fmt,
    io::Read,
};

use crate::{
    error::SmallError,
    io::{Decodeable, Encodeable, SmallWriter},
};

/// Sentinel page index meaning "no page" — used for optional sibling,
/// parent, and header-chain pointers so they can be stored as a plain
/// `u32` instead of an `Option<BTreePageID>`.
pub const EMPTY_PAGE_ID: u32 = 0;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum PageCategory {
    RootPointer,
    Internal,
    Leaf,
    Header,
}

impl PageCategory {
    fn tag(&self) -> u32 {
        match self {
            PageCategory::RootPointer => 0,
            PageCategory::Internal => 1,
            PageCategory::Leaf => 2,
            PageCategory::Header => 3,
        }
    }

    fn from_tag(tag: u32) -> Result<Self, SmallError> {
        Ok(match tag {
            0 => PageCategory::RootPointer,
            1 => PageCategory::Internal,
            2 => PageCategory::Leaf,
            3 => PageCategory::Header,
            _ => return Err(SmallError::illegal_page("unknown page category tag")),
        })
    }
}

impl Encodeable for PageCategory {
    fn encode(&self, writer: &mut SmallWriter) {
        writer.write(&self.tag());
    }
}

impl Decodeable for PageCategory {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SmallError> {
        Self::from_tag(u32::decode(reader)?)
    }
}

/// Identity of a B+ tree page: which table it belongs to, its category,
/// and its 0-based index within that category's numbering (the root-ptr
/// page always has index 0, per spec §3).
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct BTreePageID {
    pub category: PageCategory,
    pub page_index: u32,
    pub table_id: u32,
}

impl BTreePageID {
    pub fn new(category: PageCategory, table_id: u32, page_index: u32) -> Self {
        Self {
            category,
            page_index,
            table_id,
        }
    }

    pub fn root_ptr(table_id: u32) -> Self {
        Self::new(PageCategory::RootPointer, table_id, 0)
    }

    pub fn get_table_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_short_repr(&self) -> String {
        format!("{:?}_{}", self.category, self.page_index)
    }
}

impl fmt::Display for BTreePageID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get_short_repr())
    }
}
