//! Table and index schema definitions.
//!
//! A [`TableMeta`] fixes the physical record layout at creation time:
//! a null bitmap followed by fixed-width field slots. [`FieldMeta`] carries
//! the per-column byte offset and length so records can be decoded without
//! re-deriving the layout.

use crate::datum::Type;

use super::error::CatalogError;

/// A column as requested by CREATE TABLE, before layout assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub ty: Type,
    /// Declared capacity in bytes for CHAR(n); ignored for other types.
    pub len: usize,
    /// Whether NULL is allowed.
    pub nullable: bool,
}

/// Column metadata with its assigned position in the record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub ty: Type,
    /// Byte offset of this field's slot within a record.
    pub offset: usize,
    /// Slot width in bytes.
    pub len: usize,
    /// Whether NULL is allowed.
    pub nullable: bool,
}

/// Table metadata: name, identity, and the fixed record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    /// Table name.
    pub name: String,
    /// Catalog-assigned table id.
    pub id: u32,
    /// Columns in schema order.
    pub fields: Vec<FieldMeta>,
    /// Bytes reserved at the record head for the null bitmap.
    pub bitmap_len: usize,
    /// Total record size in bytes (bitmap plus all field slots).
    pub record_size: usize,
}

impl TableMeta {
    /// Builds table metadata from column specs, assigning the record layout.
    ///
    /// Slot widths: INT/FLOAT/DATE take 4 bytes, TEXT takes a 4-byte arena
    /// handle, CHAR(n) takes its declared capacity.
    pub fn build(name: &str, id: u32, columns: &[ColumnSpec]) -> Result<TableMeta, CatalogError> {
        if columns.is_empty() {
            return Err(CatalogError::NoColumns {
                table: name.to_string(),
            });
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(CatalogError::DuplicateField {
                    table: name.to_string(),
                    field: col.name.clone(),
                });
            }
        }

        let bitmap_len = columns.len().div_ceil(8);
        let mut offset = bitmap_len;
        let mut fields = Vec::with_capacity(columns.len());
        for col in columns {
            let len = match col.ty {
                Type::Int | Type::Float | Type::Date | Type::Text => 4,
                Type::Chars => col.len.max(1),
            };
            fields.push(FieldMeta {
                name: col.name.clone(),
                ty: col.ty,
                offset,
                len,
                nullable: col.nullable,
            });
            offset += len;
        }

        Ok(TableMeta {
            name: name.to_string(),
            id,
            fields,
            bitmap_len,
            record_size: offset,
        })
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field's position in schema order.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Secondary index metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Index name (unique across the database).
    pub name: String,
    /// Indexed table.
    pub table: String,
    /// Indexed column.
    pub field: String,
    /// Whether duplicate keys are rejected.
    pub unique: bool,
}
