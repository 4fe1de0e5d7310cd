//! Heap-specific errors.

use super::table::Rid;

/// Errors that can occur in heap storage operations.
#[derive(Debug)]
pub enum HeapError {
    /// Record buffer shorter than the table's record size.
    RecordTooSmall { required: usize, available: usize },

    /// Value count does not match the table's column count.
    ArityMismatch { expected: usize, found: usize },

    /// A CHAR payload exceeds the column's declared capacity.
    StringTooLong { field: String, capacity: usize, len: usize },

    /// A value's type does not match its column's type.
    FieldTypeMismatch { field: String },

    /// A TEXT handle points outside the table's arena.
    BadTextHandle { handle: u32 },

    /// Stored date bytes do not decode to a calendar date.
    BadDate { raw: i32 },

    /// No live record at the given RID.
    RecordNotFound { rid: Rid },

    /// No table registered under the given id.
    TableNotFound { id: u32 },

    /// No index registered under the given name.
    IndexNotFound { name: String },

    /// Unique index rejected a duplicate key.
    DuplicateKey { index: String, key: String },
}

impl std::fmt::Display for HeapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeapError::RecordTooSmall {
                required,
                available,
            } => write!(
                f,
                "record too small: need {} bytes, have {}",
                required, available
            ),
            HeapError::ArityMismatch { expected, found } => {
                write!(f, "expected {} values, found {}", expected, found)
            }
            HeapError::StringTooLong {
                field,
                capacity,
                len,
            } => write!(
                f,
                "value too long for column \"{}\": capacity {}, got {} bytes",
                field, capacity, len
            ),
            HeapError::FieldTypeMismatch { field } => {
                write!(f, "value type does not match column \"{}\"", field)
            }
            HeapError::BadTextHandle { handle } => {
                write!(f, "dangling text handle {}", handle)
            }
            HeapError::BadDate { raw } => write!(f, "stored date {} is not valid", raw),
            HeapError::RecordNotFound { rid } => {
                write!(f, "no record at page {} slot {}", rid.page, rid.slot)
            }
            HeapError::TableNotFound { id } => write!(f, "no heap for table id {}", id),
            HeapError::IndexNotFound { name } => write!(f, "no index \"{}\"", name),
            HeapError::DuplicateKey { index, key } => {
                write!(f, "duplicate key {} violates unique index \"{}\"", key, index)
            }
        }
    }
}

impl std::error::Error for HeapError {}
