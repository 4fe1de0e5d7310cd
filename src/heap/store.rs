//! Registry of live heap tables and indexes.
//!
//! The [`TableStore`] is the storage half of the catalog: metadata lives in
//! [`Catalog`](crate::catalog::Catalog), record data lives here. Tables are
//! keyed by the catalog-assigned table id, indexes by name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::{IndexMeta, TableMeta};

use super::error::HeapError;
use super::index::Index;
use super::table::HeapTable;

/// Registry mapping catalog identities to live storage objects.
pub struct TableStore {
    tables: RwLock<HashMap<u32, Arc<HeapTable>>>,
    indexes: RwLock<HashMap<String, Arc<Index>>>,
}

impl TableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        TableStore {
            tables: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates an empty heap for a newly created table.
    pub fn register_table(&self, meta: Arc<TableMeta>) -> Arc<HeapTable> {
        let table = Arc::new(HeapTable::new(meta.clone()));
        self.tables.write().insert(meta.id, table.clone());
        table
    }

    /// Removes a table's heap and all of its indexes.
    pub fn drop_table(&self, meta: &TableMeta) {
        self.tables.write().remove(&meta.id);
        self.indexes.write().retain(|_, idx| idx.meta().table != meta.name);
    }

    /// Looks up a table's heap by id.
    pub fn table(&self, id: u32) -> Result<Arc<HeapTable>, HeapError> {
        self.tables
            .read()
            .get(&id)
            .cloned()
            .ok_or(HeapError::TableNotFound { id })
    }

    /// Builds an index over a table's existing rows and registers it.
    ///
    /// The build scans every live record; a unique violation aborts the
    /// build and nothing is registered.
    pub fn register_index(
        &self,
        meta: Arc<IndexMeta>,
        table: &Arc<HeapTable>,
        field_index: usize,
    ) -> Result<Arc<Index>, HeapError> {
        let index = Arc::new(Index::new(meta.clone(), field_index));
        let mut scanner = table.scan();
        while let Some((rid, values)) = scanner.next()? {
            index.insert(&values[field_index], rid)?;
        }
        self.indexes.write().insert(meta.name.clone(), index.clone());
        Ok(index)
    }

    /// Removes an index by name.
    pub fn drop_index(&self, name: &str) -> Result<(), HeapError> {
        self.indexes
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| HeapError::IndexNotFound {
                name: name.to_string(),
            })
    }

    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> Result<Arc<Index>, HeapError> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| HeapError::IndexNotFound {
                name: name.to_string(),
            })
    }

    /// Returns every index registered on the given table.
    pub fn indexes_on(&self, table_name: &str) -> Vec<Arc<Index>> {
        self.indexes
            .read()
            .values()
            .filter(|idx| idx.meta().table == table_name)
            .cloned()
            .collect()
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new()
    }
}
