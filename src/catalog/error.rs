//! Catalog-specific errors.

/// Errors that can occur during catalog operations.
#[derive(Debug)]
pub enum CatalogError {
    /// Table already exists.
    TableAlreadyExists { name: String },

    /// Referenced table does not exist.
    TableNotFound { name: String },

    /// Two columns in one table definition share a name.
    DuplicateField { table: String, field: String },

    /// Table definition has no columns.
    NoColumns { table: String },

    /// Index already exists.
    IndexAlreadyExists { name: String },

    /// Referenced index does not exist.
    IndexNotFound { name: String },

    /// Index references a column the table does not have.
    FieldNotFound { table: String, field: String },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::TableAlreadyExists { name } => {
                write!(f, "table \"{}\" already exists", name)
            }
            CatalogError::TableNotFound { name } => {
                write!(f, "table \"{}\" does not exist", name)
            }
            CatalogError::DuplicateField { table, field } => {
                write!(f, "duplicate column \"{}\" in table \"{}\"", field, table)
            }
            CatalogError::NoColumns { table } => {
                write!(f, "table \"{}\" has no columns", table)
            }
            CatalogError::IndexAlreadyExists { name } => {
                write!(f, "index \"{}\" already exists", name)
            }
            CatalogError::IndexNotFound { name } => {
                write!(f, "index \"{}\" does not exist", name)
            }
            CatalogError::FieldNotFound { table, field } => {
                write!(f, "column \"{}\" does not exist in table \"{}\"", field, table)
            }
        }
    }
}

impl std::error::Error for CatalogError {}
