//! In-memory heap tables.
//!
//! A [`HeapTable`] stores encoded records in slotted pages of fixed
//! capacity. Slots are append-allocated and tombstoned on delete; RIDs stay
//! stable for the table's lifetime, so undo can restore a deleted record
//! into its original slot.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::TableMeta;
use crate::datum::Value;

use super::error::HeapError;
use super::record::{decode_record, encode_record};

/// Records per page.
const PAGE_CAPACITY: usize = 64;

/// Storage-layer record identifier: page number and slot within the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    /// Page number within the table.
    pub page: u32,
    /// Slot within the page.
    pub slot: u16,
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page, self.slot)
    }
}

#[derive(Debug)]
struct HeapInner {
    /// Slotted pages; `None` marks a free (never used or deleted) slot.
    pages: Vec<Vec<Option<Vec<u8>>>>,
    /// Out-of-line TEXT payloads, addressed by handle. Append-only; space
    /// is reclaimed only when the table is dropped.
    arena: Vec<String>,
}

/// An in-memory heap table.
#[derive(Debug)]
pub struct HeapTable {
    meta: Arc<TableMeta>,
    inner: RwLock<HeapInner>,
}

impl HeapTable {
    /// Creates an empty heap for the given table schema.
    pub fn new(meta: Arc<TableMeta>) -> Self {
        HeapTable {
            meta,
            inner: RwLock::new(HeapInner {
                pages: Vec::new(),
                arena: Vec::new(),
            }),
        }
    }

    /// Returns the table schema.
    pub fn meta(&self) -> &Arc<TableMeta> {
        &self.meta
    }

    /// Inserts a row, returning its RID.
    ///
    /// Values must already match the schema types; callers coerce first.
    pub fn insert(&self, values: &[Value]) -> Result<Rid, HeapError> {
        let mut inner = self.inner.write();
        let HeapInner { pages, arena } = &mut *inner;
        let bytes = encode_record(values, &self.meta, arena)?;

        if pages.last().is_none_or(|p| p.len() >= PAGE_CAPACITY) {
            pages.push(Vec::with_capacity(PAGE_CAPACITY));
        }
        let page = (pages.len() - 1) as u32;
        let last = pages.last_mut().expect("page allocated above");
        let slot = last.len() as u16;
        last.push(Some(bytes));
        Ok(Rid { page, slot })
    }

    /// Reads and decodes the record at `rid`.
    pub fn get(&self, rid: Rid) -> Result<Vec<Value>, HeapError> {
        let inner = self.inner.read();
        let bytes = live_record(&inner, rid)?;
        decode_record(bytes, &self.meta, &inner.arena)
    }

    /// Overwrites the record at `rid` with new values, returning the old row.
    pub fn update(&self, rid: Rid, values: &[Value]) -> Result<Vec<Value>, HeapError> {
        let mut inner = self.inner.write();
        let old = {
            let bytes = live_record(&inner, rid)?;
            decode_record(bytes, &self.meta, &inner.arena)?
        };
        let HeapInner { pages, arena } = &mut *inner;
        let bytes = encode_record(values, &self.meta, arena)?;
        pages[rid.page as usize][rid.slot as usize] = Some(bytes);
        Ok(old)
    }

    /// Deletes the record at `rid`, returning the old row.
    pub fn delete(&self, rid: Rid) -> Result<Vec<Value>, HeapError> {
        let mut inner = self.inner.write();
        let old = {
            let bytes = live_record(&inner, rid)?;
            decode_record(bytes, &self.meta, &inner.arena)?
        };
        inner.pages[rid.page as usize][rid.slot as usize] = None;
        Ok(old)
    }

    /// Restores a previously deleted record into its original slot.
    ///
    /// Undo support: the slot must exist (it was allocated by the insert
    /// being compensated) and must currently be free.
    pub fn restore(&self, rid: Rid, values: &[Value]) -> Result<(), HeapError> {
        let mut inner = self.inner.write();
        let HeapInner { pages, arena } = &mut *inner;
        let slot = pages
            .get_mut(rid.page as usize)
            .and_then(|p| p.get_mut(rid.slot as usize))
            .ok_or(HeapError::RecordNotFound { rid })?;
        *slot = Some(encode_record(values, &self.meta, arena)?);
        Ok(())
    }

    /// Returns the number of live records.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .pages
            .iter()
            .map(|p| p.iter().filter(|s| s.is_some()).count())
            .sum()
    }

    /// Returns true if the table has no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a scanner over all live records in RID order.
    pub fn scan(self: &Arc<Self>) -> RecordScanner {
        RecordScanner {
            table: Arc::clone(self),
            page: 0,
            slot: 0,
        }
    }
}

fn live_record(inner: &HeapInner, rid: Rid) -> Result<&Vec<u8>, HeapError> {
    inner
        .pages
        .get(rid.page as usize)
        .and_then(|p| p.get(rid.slot as usize))
        .and_then(|s| s.as_ref())
        .ok_or(HeapError::RecordNotFound { rid })
}

/// Cursor over a table's live records, yielding `(Rid, row)` in RID order.
///
/// The scanner tracks a position rather than a snapshot: records inserted
/// behind the cursor are not revisited, records deleted ahead of it are
/// skipped.
pub struct RecordScanner {
    table: Arc<HeapTable>,
    page: u32,
    slot: u16,
}

impl RecordScanner {
    /// Returns the next live record, or `None` at end of table.
    pub fn next(&mut self) -> Result<Option<(Rid, Vec<Value>)>, HeapError> {
        loop {
            let inner = self.table.inner.read();
            let Some(page) = inner.pages.get(self.page as usize) else {
                return Ok(None);
            };
            if self.slot as usize >= PAGE_CAPACITY || self.slot as usize >= page.len() {
                // A short page can still grow; only advance past it once full.
                if page.len() >= PAGE_CAPACITY {
                    drop(inner);
                    self.page += 1;
                    self.slot = 0;
                    continue;
                }
                return Ok(None);
            }
            let rid = Rid {
                page: self.page,
                slot: self.slot,
            };
            self.slot += 1;
            if let Some(bytes) = &page[rid.slot as usize] {
                let values = decode_record(bytes, &self.table.meta, &inner.arena)?;
                return Ok(Some((rid, values)));
            }
        }
    }
}
