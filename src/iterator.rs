use std::iter::Peekable;

use crate::{
    error::SmallError,
    transaction::Transaction,
    tuple::{Tuple, TupleDesc},
    types::SmallResult,
};

/// Pull-model restartable iterator contract shared by every tuple source
/// (spec §4.5): `open / has_next / next / rewind / close`. `next` after
/// `!has_next` and any call before `open`/after `close` are logic errors,
/// reported as `NotFound` rather than panicking.
pub trait DbFileIterator {
    type Item;

    fn open(&mut self) -> SmallResult;
    fn has_next(&mut self) -> Result<bool, SmallError>;
    fn next(&mut self) -> Result<Self::Item, SmallError>;

    /// Close then open again; implementations must not cache page handles
    /// or locks across a rewind, so this always re-acquires them fresh.
    fn rewind(&mut self) -> SmallResult {
        self.close();
        self.open()
    }

    fn close(&mut self);
}

/// The on-disk table abstraction `SeqScan` scans against: implemented by
/// both `HeapFile` and `BTreeTable` (spec §6) so the operator layer can
/// drive either one without knowing which it has. `PageId` is an
/// associated type rather than a shared concrete type because the two
/// page-addressing schemes differ (`page_id::PageId` is a bare page
/// number; `btree::page_id::BTreePageID` also carries a page category).
pub trait DbFile {
    type PageId;

    fn get_id(&self) -> u32;
    fn get_tuple_desc(&self) -> TupleDesc;
    fn read_page(&self, pid: &Self::PageId) -> Result<Vec<u8>, SmallError>;
    fn write_page(&self, pid: &Self::PageId, bytes: &[u8]) -> SmallResult;
    fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> SmallResult;
    fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> SmallResult;

    /// A restartable scan over every tuple in the file, in the file's
    /// natural order (heap: page order; B+ tree: index order).
    fn iterator<'t>(&self, tx: &'t Transaction) -> Result<Box<dyn DbFileIterator<Item = Tuple> + 't>, SmallError>;
}

/// Same open/has_next/next/rewind/close contract, specialized to the
/// operator layer, which only ever hands plain `Tuple` rows upward (no
/// page/slot bookkeeping past the `DbFile` boundary).
pub trait OpIterator {
    fn open(&mut self) -> SmallResult;
    fn has_next(&mut self) -> Result<bool, SmallError>;
    fn next(&mut self) -> Result<Tuple, SmallError>;

    fn rewind(&mut self) -> SmallResult {
        self.close();
        self.open()
    }

    fn close(&mut self);
}

/// Adapts a plain `std::iter::Iterator` factory into a restartable
/// `DbFileIterator`. `factory` is called on every `open`/`rewind` to
/// build a fresh underlying iterator, so a rewind re-walks the table
/// (and re-acquires locks) exactly as the spec requires instead of
/// replaying a cached one.
pub struct RestartableIter<T: Iterator, F: Fn() -> Result<T, SmallError>> {
    factory: F,
    inner: Option<Peekable<T>>,
}

impl<T: Iterator, F: Fn() -> Result<T, SmallError>> RestartableIter<T, F> {
    pub fn new(factory: F) -> Self {
        Self { factory, inner: None }
    }

    fn opened(&mut self) -> Result<&mut Peekable<T>, SmallError> {
        self.inner
            .as_mut()
            .ok_or_else(|| SmallError::not_found("iterator used before open() or after close()"))
    }
}

impl<T: Iterator, F: Fn() -> Result<T, SmallError>> DbFileIterator for RestartableIter<T, F> {
    type Item = T::Item;

    fn open(&mut self) -> SmallResult {
        let it = (self.factory)()?;
        self.inner = Some(it.peekable());
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, SmallError> {
        Ok(self.opened()?.peek().is_some())
    }

    fn next(&mut self) -> Result<Self::Item, SmallError> {
        self.opened()?
            .next()
            .ok_or_else(|| SmallError::not_found("next() called with no more elements"))
    }

    fn close(&mut self) {
        self.inner = None;
    }
}
