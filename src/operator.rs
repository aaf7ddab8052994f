use std::collections::HashMap;

use crate::{
    btree::table::Predicate,
    database::Database,
    error::SmallError,
    field::{Field, IntField, Type},
    iterator::{DbFile, DbFileIterator, OpIterator},
    transaction::Transaction,
    tuple::{Tuple, TupleDesc},
    types::SmallResult,
};

/// Full scan of one registered table, heap or B+ tree alike, wrapping
/// whichever `DbFile::iterator` the catalog hands back. Tries the B+
/// tree registry first since that is the common case in this crate's
/// tests; falls back to the heap registry. Exactly one of the two will
/// ever match a given `table_id`.
pub struct SeqScan<'t> {
    tx: &'t Transaction,
    table_id: u32,
    inner: Option<Box<dyn DbFileIterator<Item = Tuple> + 't>>,
}

impl<'t> SeqScan<'t> {
    pub fn new(tx: &'t Transaction, table_id: u32) -> Self {
        Self { tx, table_id, inner: None }
    }

    fn build(&self) -> Result<Box<dyn DbFileIterator<Item = Tuple> + 't>, SmallError> {
        let catalog = Database::catalog();
        if let Ok(table) = catalog.get_btree_table(self.table_id) {
            drop(catalog);
            return DbFile::iterator(&*table.read().unwrap(), self.tx);
        }

        let file = catalog.get_database_file(self.table_id)?;
        drop(catalog);
        DbFile::iterator(&*file.read().unwrap(), self.tx)
    }
}

impl<'t> OpIterator for SeqScan<'t> {
    fn open(&mut self) -> SmallResult {
        let mut it = self.build()?;
        it.open()?;
        self.inner = Some(it);
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, SmallError> {
        let it = self
            .inner
            .as_mut()
            .ok_or_else(|| SmallError::not_found("SeqScan used before open()"))?;
        it.has_next()
    }

    fn next(&mut self) -> Result<Tuple, SmallError> {
        let it = self
            .inner
            .as_mut()
            .ok_or_else(|| SmallError::not_found("SeqScan used before open()"))?;
        it.next()
    }

    fn rewind(&mut self) -> SmallResult {
        let it = self
            .inner
            .as_mut()
            .ok_or_else(|| SmallError::not_found("SeqScan used before open()"))?;
        it.rewind()
    }

    fn close(&mut self) {
        if let Some(it) = self.inner.as_mut() {
            it.close();
        }
        self.inner = None;
    }
}

/// Filters a child operator's output against a single predicate on one
/// field, grounded in the ancestor's `Op`/`Predicate` pair (now shared
/// with B+ tree index search, see `btree::table`).
pub struct Filter<'t> {
    predicate: Predicate,
    field_index: usize,
    child: Box<dyn OpIterator + 't>,
    buffered: Option<Tuple>,
}

impl<'t> Filter<'t> {
    pub fn new(predicate: Predicate, field_index: usize, child: Box<dyn OpIterator + 't>) -> Self {
        Self { predicate, field_index, child, buffered: None }
    }

    fn matches(&self, t: &Tuple) -> bool {
        self.predicate.matches(t.get_field(self.field_index))
    }

    fn advance(&mut self) -> Result<(), SmallError> {
        while self.buffered.is_none() && self.child.has_next()? {
            let t = self.child.next()?;
            if self.matches(&t) {
                self.buffered = Some(t);
            }
        }
        Ok(())
    }
}

impl<'t> OpIterator for Filter<'t> {
    fn open(&mut self) -> SmallResult {
        self.child.open()?;
        self.buffered = None;
        self.advance()
    }

    fn has_next(&mut self) -> Result<bool, SmallError> {
        self.advance()?;
        Ok(self.buffered.is_some())
    }

    fn next(&mut self) -> Result<Tuple, SmallError> {
        self.advance()?;
        self.buffered.take().ok_or_else(|| SmallError::not_found("Filter exhausted"))
    }

    fn close(&mut self) {
        self.child.close();
        self.buffered = None;
    }
}

fn count_desc() -> TupleDesc {
    TupleDesc::new(&[Type::Int], &["count"])
}

fn count_tuple(n: i32) -> Tuple {
    Tuple::new(count_desc(), vec![Field::Int(IntField::new(n))])
}

/// Inserts every tuple the child operator produces into `table_id`,
/// returning a single `(count)` row, per the ancestor's `operator.rs`
/// convention for mutating operators.
pub struct Insert<'t> {
    tx: &'t Transaction,
    table_id: u32,
    child: Box<dyn OpIterator + 't>,
    result: Option<Tuple>,
}

impl<'t> Insert<'t> {
    pub fn new(tx: &'t Transaction, table_id: u32, child: Box<dyn OpIterator + 't>) -> Self {
        Self { tx, table_id, child, result: None }
    }

    fn insert_one(&self, tuple: &Tuple) -> SmallResult {
        let catalog = Database::catalog();
        if let Ok(table) = catalog.get_btree_table(self.table_id) {
            drop(catalog);
            return table.read().unwrap().insert_tuple(self.tx, tuple);
        }
        let file = catalog.get_database_file(self.table_id)?;
        drop(catalog);
        file.read().unwrap().insert_tuple(self.tx, tuple)
    }
}

impl<'t> OpIterator for Insert<'t> {
    fn open(&mut self) -> SmallResult {
        self.child.open()?;
        self.result = None;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, SmallError> {
        Ok(self.result.is_none())
    }

    fn next(&mut self) -> Result<Tuple, SmallError> {
        if self.result.is_some() {
            return Err(SmallError::not_found("Insert already produced its result"));
        }
        let mut count = 0i32;
        while self.child.has_next()? {
            let t = self.child.next()?;
            self.insert_one(&t)?;
            count += 1;
        }
        let out = count_tuple(count);
        self.result = Some(out.clone());
        Ok(out)
    }

    fn close(&mut self) {
        self.child.close();
    }
}

/// Deletes every tuple the child operator produces from `table_id`,
/// returning a single `(count)` row.
pub struct Delete<'t> {
    tx: &'t Transaction,
    table_id: u32,
    child: Box<dyn OpIterator + 't>,
    result: Option<Tuple>,
}

impl<'t> Delete<'t> {
    pub fn new(tx: &'t Transaction, table_id: u32, child: Box<dyn OpIterator + 't>) -> Self {
        Self { tx, table_id, child, result: None }
    }

    fn delete_one(&self, tuple: &Tuple) -> SmallResult {
        let catalog = Database::catalog();
        if let Ok(table) = catalog.get_btree_table(self.table_id) {
            drop(catalog);
            return table.read().unwrap().delete_tuple_by_key(self.tx, tuple);
        }
        let file = catalog.get_database_file(self.table_id)?;
        drop(catalog);
        file.read().unwrap().delete_tuple(self.tx, tuple)
    }
}

impl<'t> OpIterator for Delete<'t> {
    fn open(&mut self) -> SmallResult {
        self.child.open()?;
        self.result = None;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, SmallError> {
        Ok(self.result.is_none())
    }

    fn next(&mut self) -> Result<Tuple, SmallError> {
        if self.result.is_some() {
            return Err(SmallError::not_found("Delete already produced its result"));
        }
        let mut count = 0i32;
        while self.child.has_next()? {
            let t = self.child.next()?;
            self.delete_one(&t)?;
            count += 1;
        }
        let out = count_tuple(count);
        self.result = Some(out.clone());
        Ok(out)
    }

    fn close(&mut self) {
        self.child.close();
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AggOp {
    Count,
    Sum,
    Min,
    Max,
}

enum Acc {
    Count(i32),
    Sum(i32),
    /// `None` until the first value is merged — MIN/MAX on an empty
    /// group stay unspecified per spec §9's open question, resolved
    /// here as "no result row for that group" rather than a sentinel.
    MinMax(Option<i32>),
}

impl Acc {
    fn new(op: AggOp) -> Self {
        match op {
            AggOp::Count => Acc::Count(0),
            AggOp::Sum => Acc::Sum(0),
            AggOp::Min | AggOp::Max => Acc::MinMax(None),
        }
    }

    fn merge(&mut self, op: AggOp, v: i32) {
        match self {
            Acc::Count(n) => *n += 1,
            Acc::Sum(n) => *n += v,
            Acc::MinMax(cur) => {
                *cur = Some(match (*cur, op) {
                    (None, _) => v,
                    (Some(c), AggOp::Min) => c.min(v),
                    (Some(c), AggOp::Max) => c.max(v),
                    (Some(c), _) => c,
                })
            }
        }
    }

    fn finish(&self) -> Option<i32> {
        match self {
            Acc::Count(n) => Some(*n),
            Acc::Sum(n) => Some(*n),
            Acc::MinMax(v) => *v,
        }
    }
}

/// COUNT/SUM/MIN/MAX over one field, with optional single-column
/// grouping, matching the ancestor's aggregation shims and nothing of
/// the full query-planner aggregator (no HAVING, no multi-column
/// grouping — out of scope per `spec.md`).
pub struct Aggregate<'t> {
    op: AggOp,
    agg_field: usize,
    group_field: Option<usize>,
    child: Box<dyn OpIterator + 't>,
    out_desc: TupleDesc,
    results: Option<std::vec::IntoIter<Tuple>>,
}

impl<'t> Aggregate<'t> {
    pub fn new(op: AggOp, agg_field: usize, group_field: Option<usize>, child: Box<dyn OpIterator + 't>) -> Self {
        let out_desc = match group_field {
            Some(_) => TupleDesc::new(&[Type::Int, Type::Int], &["group", "agg"]),
            None => TupleDesc::new(&[Type::Int], &["agg"]),
        };
        Self { op, agg_field, group_field, child, out_desc, results: None }
    }

    fn as_int(field: &Field) -> Result<i32, SmallError> {
        match field {
            Field::Int(i) => Ok(i.value),
            Field::Str(_) => Err(SmallError::schema_mismatch("aggregation field must be an int")),
        }
    }

    fn compute(&mut self) -> Result<Vec<Tuple>, SmallError> {
        let mut groups: HashMap<Option<i32>, Acc> = HashMap::new();
        let mut order: Vec<Option<i32>> = Vec::new();

        self.child.open()?;
        while self.child.has_next()? {
            let t = self.child.next()?;
            let v = Self::as_int(t.get_field(self.agg_field))?;
            let key = match self.group_field {
                Some(i) => Some(Self::as_int(t.get_field(i))?),
                None => None,
            };
            if !groups.contains_key(&key) {
                groups.insert(key, Acc::new(self.op));
                order.push(key);
            }
            groups.get_mut(&key).unwrap().merge(self.op, v);
        }
        self.child.close();

        let mut out = Vec::new();
        for key in order {
            let acc = &groups[&key];
            if let Some(v) = acc.finish() {
                let fields = match key {
                    Some(g) => vec![Field::Int(IntField::new(g)), Field::Int(IntField::new(v))],
                    None => vec![Field::Int(IntField::new(v))],
                };
                out.push(Tuple::new(self.out_desc.clone(), fields));
            }
        }
        Ok(out)
    }
}

impl<'t> OpIterator for Aggregate<'t> {
    fn open(&mut self) -> SmallResult {
        let rows = self.compute()?;
        self.results = Some(rows.into_iter());
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, SmallError> {
        let it = self
            .results
            .as_ref()
            .ok_or_else(|| SmallError::not_found("Aggregate used before open()"))?;
        Ok(it.len() > 0)
    }

    fn next(&mut self) -> Result<Tuple, SmallError> {
        let it = self
            .results
            .as_mut()
            .ok_or_else(|| SmallError::not_found("Aggregate used before open()"))?;
        it.next().ok_or_else(|| SmallError::not_found("Aggregate exhausted"))
    }

    fn close(&mut self) {
        self.results = None;
    }
}
