//! Schema catalog: table and index metadata.
//!
//! The catalog owns every [`TableMeta`] and [`IndexMeta`] in the database.
//! Query execution holds `Arc` snapshots of table metadata, which outlive
//! any single statement; the catalog map itself is guarded by a lock so
//! DDL from concurrent sessions stays consistent.

mod core;
mod error;
mod schema;

pub use self::core::Catalog;
pub use error::CatalogError;
pub use schema::{ColumnSpec, FieldMeta, IndexMeta, TableMeta};
