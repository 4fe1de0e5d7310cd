//! Ordered secondary indexes.
//!
//! An [`Index`] maps key values to the RIDs of the rows holding them, in
//! key order, backed by a `BTreeMap`. NULL keys are not indexed: IS NULL
//! predicates always go through a table scan.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::IndexMeta;
use crate::datum::Value;

use super::error::HeapError;
use super::table::Rid;

/// A value wrapper with total ordering, usable as a BTreeMap key.
///
/// All keys in one index come from one column and therefore share a type,
/// so [`Value::compare`] always produces an ordering for them; mixed-type
/// pairs (which only arise transiently through coercion at lookup time)
/// fall back to type-tag order.
#[derive(Debug, Clone, PartialEq)]
struct IndexKey(Value);

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .compare(&other.0)
            .unwrap_or_else(|| type_rank(&self.0).cmp(&type_rank(&other.0)))
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Int(_) => 1,
        Value::Float(_) => 1,
        Value::Chars(_) => 2,
        Value::Text(_) => 2,
        Value::Date(_) => 3,
    }
}

/// Inclusive-or-unbounded key range for an index scan.
#[derive(Debug, Clone)]
pub struct IndexRange {
    /// Lower bound.
    pub low: Bound<Value>,
    /// Upper bound.
    pub high: Bound<Value>,
}

impl IndexRange {
    /// The range matching exactly one key.
    pub fn point(key: Value) -> Self {
        IndexRange {
            low: Bound::Included(key.clone()),
            high: Bound::Included(key),
        }
    }
}

/// An ordered secondary index over one column.
#[derive(Debug)]
pub struct Index {
    meta: Arc<IndexMeta>,
    /// Position of the indexed column in the table's schema.
    field_index: usize,
    entries: RwLock<BTreeMap<IndexKey, Vec<Rid>>>,
}

impl Index {
    /// Creates an empty index.
    pub fn new(meta: Arc<IndexMeta>, field_index: usize) -> Self {
        Index {
            meta,
            field_index,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the index metadata.
    pub fn meta(&self) -> &Arc<IndexMeta> {
        &self.meta
    }

    /// Returns the indexed column's position in the table schema.
    pub fn field_index(&self) -> usize {
        self.field_index
    }

    /// Adds an entry for a row. NULL keys are skipped.
    ///
    /// A unique index rejects the insert when the key is already present.
    pub fn insert(&self, key: &Value, rid: Rid) -> Result<(), HeapError> {
        if key.is_null() {
            return Ok(());
        }
        let mut entries = self.entries.write();
        let rids = entries.entry(IndexKey(key.clone())).or_default();
        if self.meta.unique && !rids.is_empty() {
            return Err(HeapError::DuplicateKey {
                index: self.meta.name.clone(),
                key: key.to_text(),
            });
        }
        rids.push(rid);
        Ok(())
    }

    /// Removes a row's entry. Missing entries are ignored.
    pub fn remove(&self, key: &Value, rid: Rid) {
        if key.is_null() {
            return;
        }
        let key = IndexKey(key.clone());
        let mut entries = self.entries.write();
        let now_empty = match entries.get_mut(&key) {
            Some(rids) => {
                rids.retain(|r| *r != rid);
                rids.is_empty()
            }
            None => false,
        };
        if now_empty {
            entries.remove(&key);
        }
    }

    /// Returns the RIDs whose key lies in `range`, in key order.
    pub fn scan(&self, range: &IndexRange) -> Vec<Rid> {
        let low = bound_key(&range.low);
        let high = bound_key(&range.high);
        self.entries
            .read()
            .range((low, high))
            .flat_map(|(_, rids)| rids.iter().copied())
            .collect()
    }
}

fn bound_key(bound: &Bound<Value>) -> Bound<IndexKey> {
    match bound {
        Bound::Included(v) => Bound::Included(IndexKey(v.clone())),
        Bound::Excluded(v) => Bound::Excluded(IndexKey(v.clone())),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(unique: bool) -> Index {
        Index::new(
            Arc::new(IndexMeta {
                name: "t_a".to_string(),
                table: "t".to_string(),
                field: "a".to_string(),
                unique,
            }),
            0,
        )
    }

    fn rid(slot: u16) -> Rid {
        Rid { page: 0, slot }
    }

    #[test]
    fn test_point_lookup() {
        let idx = index(false);
        idx.insert(&Value::Int(5), rid(0)).unwrap();
        idx.insert(&Value::Int(5), rid(1)).unwrap();
        idx.insert(&Value::Int(7), rid(2)).unwrap();

        let hits = idx.scan(&IndexRange::point(Value::Int(5)));
        assert_eq!(hits, vec![rid(0), rid(1)]);
    }

    #[test]
    fn test_range_scan_in_key_order() {
        let idx = index(false);
        idx.insert(&Value::Int(30), rid(0)).unwrap();
        idx.insert(&Value::Int(10), rid(1)).unwrap();
        idx.insert(&Value::Int(20), rid(2)).unwrap();

        let hits = idx.scan(&IndexRange {
            low: Bound::Included(Value::Int(10)),
            high: Bound::Excluded(Value::Int(30)),
        });
        assert_eq!(hits, vec![rid(1), rid(2)]);
    }

    #[test]
    fn test_unique_rejects_duplicates() {
        let idx = index(true);
        idx.insert(&Value::Int(1), rid(0)).unwrap();
        let err = idx.insert(&Value::Int(1), rid(1)).unwrap_err();
        assert!(matches!(err, HeapError::DuplicateKey { .. }));
    }

    #[test]
    fn test_null_keys_skipped() {
        let idx = index(true);
        idx.insert(&Value::Null, rid(0)).unwrap();
        idx.insert(&Value::Null, rid(1)).unwrap();
        assert!(idx
            .scan(&IndexRange {
                low: Bound::Unbounded,
                high: Bound::Unbounded,
            })
            .is_empty());
    }

    #[test]
    fn test_remove() {
        let idx = index(false);
        idx.insert(&Value::Int(1), rid(0)).unwrap();
        idx.insert(&Value::Int(1), rid(1)).unwrap();
        idx.remove(&Value::Int(1), rid(0));
        assert_eq!(idx.scan(&IndexRange::point(Value::Int(1))), vec![rid(1)]);
        idx.remove(&Value::Int(1), rid(1));
        assert!(idx.scan(&IndexRange::point(Value::Int(1))).is_empty());
    }
}
