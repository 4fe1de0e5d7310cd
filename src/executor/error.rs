//! Executor-specific errors.
//!
//! One enum covers both bind-time failures (produced synchronously by the
//! planner, never seen by operators) and runtime failures (which abort the
//! statement and unwind through the operator tree).

use crate::catalog::CatalogError;
use crate::heap::HeapError;
use crate::tx::TxError;

/// Errors that can occur during planning or query execution.
#[derive(Debug)]
pub enum ExecutorError {
    /// Referenced table does not exist.
    TableNotFound { name: String },

    /// Referenced column does not exist.
    FieldNotFound { name: String },

    /// Column reference matches more than one in-scope column.
    AmbiguousReference { name: String },

    /// Two FROM entries resolve to the same exposed name.
    DuplicateAlias { alias: String },

    /// Operand types cannot be compared or assigned.
    TypeMismatch { expected: String, found: String },

    /// Malformed statement input (bad date literal, wrong arity, ...).
    InvalidArgument(String),

    /// Aggregate call in a position that does not allow one.
    AggregateNotAllowed { context: String },

    /// Non-aggregated column selected without a covering GROUP BY.
    GroupByMissing { column: String },

    /// Subquery produced the wrong number of columns.
    SubqueryArity { found: usize },

    /// Scalar subquery produced a row count other than one.
    SubqueryRowCount { rows: usize },

    /// Bad argument to a scalar function.
    FunctionArgument { func: String, detail: String },

    /// NULL written to a NOT NULL column.
    NotNullViolation { column: String },

    /// Integer division by a zero literal in constant evaluation.
    DivisionByZero,

    /// Integer arithmetic overflowed.
    IntegerOverflow,

    /// Feature that parses but has no execution wiring.
    Unsupported(String),

    /// Catalog lookup or DDL error.
    Catalog(CatalogError),

    /// Heap storage error.
    Heap(HeapError),

    /// Transaction error (lock conflicts, finished transactions).
    Tx(TxError),
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::TableNotFound { name } => {
                write!(f, "table \"{}\" does not exist", name)
            }
            ExecutorError::FieldNotFound { name } => {
                write!(f, "column \"{}\" does not exist", name)
            }
            ExecutorError::AmbiguousReference { name } => {
                write!(f, "column reference \"{}\" is ambiguous", name)
            }
            ExecutorError::DuplicateAlias { alias } => {
                write!(f, "table name \"{}\" specified more than once", alias)
            }
            ExecutorError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            ExecutorError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            ExecutorError::AggregateNotAllowed { context } => {
                write!(f, "aggregate functions are not allowed in {}", context)
            }
            ExecutorError::GroupByMissing { column } => {
                write!(
                    f,
                    "column \"{}\" must appear in the GROUP BY clause or be used in an aggregate",
                    column
                )
            }
            ExecutorError::SubqueryArity { found } => {
                write!(f, "subquery must return one column, returned {}", found)
            }
            ExecutorError::SubqueryRowCount { rows } => {
                write!(f, "scalar subquery returned {} rows, expected 1", rows)
            }
            ExecutorError::FunctionArgument { func, detail } => {
                write!(f, "bad argument to {}(): {}", func.to_uppercase(), detail)
            }
            ExecutorError::NotNullViolation { column } => {
                write!(f, "null value in column \"{}\" violates not-null constraint", column)
            }
            ExecutorError::DivisionByZero => write!(f, "division by zero"),
            ExecutorError::IntegerOverflow => write!(f, "integer overflow"),
            ExecutorError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            ExecutorError::Catalog(e) => write!(f, "{}", e),
            ExecutorError::Heap(e) => write!(f, "{}", e),
            ExecutorError::Tx(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Catalog(e) => Some(e),
            ExecutorError::Heap(e) => Some(e),
            ExecutorError::Tx(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CatalogError> for ExecutorError {
    fn from(e: CatalogError) -> Self {
        ExecutorError::Catalog(e)
    }
}

impl From<HeapError> for ExecutorError {
    fn from(e: HeapError) -> Self {
        ExecutorError::Heap(e)
    }
}

impl From<TxError> for ExecutorError {
    fn from(e: TxError) -> Self {
        ExecutorError::Tx(e)
    }
}
