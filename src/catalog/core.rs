//! The catalog proper: a locked map of table and index metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::CatalogError;
use super::schema::{ColumnSpec, IndexMeta, TableMeta};

/// First id handed to a user table.
const FIRST_TABLE_ID: u32 = 1;

#[derive(Default)]
struct CatalogInner {
    tables: HashMap<String, Arc<TableMeta>>,
    indexes: HashMap<String, Arc<IndexMeta>>,
    next_table_id: u32,
}

/// The schema catalog.
///
/// Lookups hand out `Arc<TableMeta>` snapshots; a statement resolved
/// against a snapshot keeps executing against it even if concurrent DDL
/// drops the table (the heap rejects the orphaned table id instead).
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Catalog {
            inner: RwLock::new(CatalogInner {
                tables: HashMap::new(),
                indexes: HashMap::new(),
                next_table_id: FIRST_TABLE_ID,
            }),
        }
    }

    /// Creates a table and returns its metadata.
    pub fn create_table(
        &self,
        name: &str,
        columns: &[ColumnSpec],
    ) -> Result<Arc<TableMeta>, CatalogError> {
        let mut inner = self.inner.write();
        if inner.tables.contains_key(name) {
            return Err(CatalogError::TableAlreadyExists {
                name: name.to_string(),
            });
        }
        let id = inner.next_table_id;
        let meta = Arc::new(TableMeta::build(name, id, columns)?);
        inner.next_table_id += 1;
        inner.tables.insert(name.to_string(), meta.clone());
        Ok(meta)
    }

    /// Drops a table and every index defined on it.
    pub fn drop_table(&self, name: &str) -> Result<Arc<TableMeta>, CatalogError> {
        let mut inner = self.inner.write();
        let meta = inner
            .tables
            .remove(name)
            .ok_or_else(|| CatalogError::TableNotFound {
                name: name.to_string(),
            })?;
        inner.indexes.retain(|_, idx| idx.table != name);
        Ok(meta)
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Result<Arc<TableMeta>, CatalogError> {
        self.inner
            .read()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound {
                name: name.to_string(),
            })
    }

    /// Returns all table names in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registers an index after validating its table and column exist.
    pub fn create_index(&self, index: IndexMeta) -> Result<Arc<IndexMeta>, CatalogError> {
        let mut inner = self.inner.write();
        if inner.indexes.contains_key(&index.name) {
            return Err(CatalogError::IndexAlreadyExists { name: index.name });
        }
        let table = inner
            .tables
            .get(&index.table)
            .ok_or_else(|| CatalogError::TableNotFound {
                name: index.table.clone(),
            })?;
        if table.field(&index.field).is_none() {
            return Err(CatalogError::FieldNotFound {
                table: index.table.clone(),
                field: index.field.clone(),
            });
        }
        let index = Arc::new(index);
        inner.indexes.insert(index.name.clone(), index.clone());
        Ok(index)
    }

    /// Removes an index by name.
    pub fn drop_index(&self, name: &str) -> Result<Arc<IndexMeta>, CatalogError> {
        self.inner
            .write()
            .indexes
            .remove(name)
            .ok_or_else(|| CatalogError::IndexNotFound {
                name: name.to_string(),
            })
    }

    /// Returns every index defined on the given table.
    pub fn indexes_on(&self, table: &str) -> Vec<Arc<IndexMeta>> {
        let mut indexes: Vec<Arc<IndexMeta>> = self
            .inner
            .read()
            .indexes
            .values()
            .filter(|idx| idx.table == table)
            .cloned()
            .collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        indexes
    }

    /// Returns the index covering `table.field`, if one exists.
    pub fn index_on_field(&self, table: &str, field: &str) -> Option<Arc<IndexMeta>> {
        self.inner
            .read()
            .indexes
            .values()
            .find(|idx| idx.table == table && idx.field == field)
            .cloned()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;

    fn int_col(name: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            ty: Type::Int,
            len: 0,
            nullable: false,
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let catalog = Catalog::new();
        let meta = catalog.create_table("t", &[int_col("a")]).unwrap();
        assert_eq!(meta.name, "t");
        assert_eq!(catalog.table("t").unwrap().id, meta.id);
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let catalog = Catalog::new();
        catalog.create_table("t", &[int_col("a")]).unwrap();
        let err = catalog.create_table("t", &[int_col("a")]).unwrap_err();
        assert!(matches!(err, CatalogError::TableAlreadyExists { .. }));
    }

    #[test]
    fn test_table_ids_distinct() {
        let catalog = Catalog::new();
        let a = catalog.create_table("a", &[int_col("x")]).unwrap();
        let b = catalog.create_table("b", &[int_col("x")]).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_drop_table_removes_indexes() {
        let catalog = Catalog::new();
        catalog.create_table("t", &[int_col("a")]).unwrap();
        catalog
            .create_index(IndexMeta {
                name: "t_a".to_string(),
                table: "t".to_string(),
                field: "a".to_string(),
                unique: false,
            })
            .unwrap();
        assert!(catalog.index_on_field("t", "a").is_some());

        catalog.drop_table("t").unwrap();
        assert!(catalog.index_on_field("t", "a").is_none());
        assert!(matches!(
            catalog.table("t").unwrap_err(),
            CatalogError::TableNotFound { .. }
        ));
    }

    #[test]
    fn test_index_requires_existing_column() {
        let catalog = Catalog::new();
        catalog.create_table("t", &[int_col("a")]).unwrap();
        let err = catalog
            .create_index(IndexMeta {
                name: "t_b".to_string(),
                table: "t".to_string(),
                field: "b".to_string(),
                unique: false,
            })
            .unwrap_err();
        assert!(matches!(err, CatalogError::FieldNotFound { .. }));
    }

    #[test]
    fn test_table_names_sorted() {
        let catalog = Catalog::new();
        catalog.create_table("zeta", &[int_col("a")]).unwrap();
        catalog.create_table("alpha", &[int_col("a")]).unwrap();
        assert_eq!(catalog.table_names(), vec!["alpha", "zeta"]);
    }
}
