//! Row-shaped values flowing through the operator pipeline.
//!
//! A [`Tuple`] is a read-only view over one row. The variants record
//! provenance: scan leaves produce `Row` tuples that remember their RID
//! (DML executors need it), joins concatenate two children, and computing
//! operators (projection, aggregation, calc) produce plain `Values`.
//! Cell access goes through a single positional dispatcher; all name
//! resolution happened at bind time.

use crate::datum::Value;
use crate::heap::Rid;

/// One row flowing between operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Tuple {
    /// A record read from a heap table.
    Row {
        /// Owning table id.
        table_id: u32,
        /// Record identity, for UPDATE/DELETE.
        rid: Rid,
        /// Decoded field values in schema order.
        values: Vec<Value>,
    },
    /// Concatenation of two child tuples (join output). Cells of the left
    /// child come first.
    Joined {
        left: Box<Tuple>,
        right: Box<Tuple>,
    },
    /// Computed values with no table identity.
    Values(Vec<Value>),
}

impl Tuple {
    /// Returns the number of cells.
    pub fn cell_count(&self) -> usize {
        match self {
            Tuple::Row { values, .. } | Tuple::Values(values) => values.len(),
            Tuple::Joined { left, right } => left.cell_count() + right.cell_count(),
        }
    }

    /// Returns the cell at position `i`, or NULL when out of range.
    ///
    /// Out-of-range access indicates a planner bug; returning NULL instead
    /// of panicking keeps the engine total on malformed plans.
    pub fn cell_at(&self, i: usize) -> &Value {
        match self {
            Tuple::Row { values, .. } | Tuple::Values(values) => {
                values.get(i).unwrap_or(&Value::Null)
            }
            Tuple::Joined { left, right } => {
                let left_len = left.cell_count();
                if i < left_len {
                    left.cell_at(i)
                } else {
                    right.cell_at(i - left_len)
                }
            }
        }
    }

    /// Collects all cells into a flat vector.
    pub fn cells(&self) -> Vec<Value> {
        match self {
            Tuple::Row { values, .. } | Tuple::Values(values) => values.clone(),
            Tuple::Joined { left, right } => {
                let mut out = left.cells();
                out.extend(right.cells());
                out
            }
        }
    }

    /// Returns the base table row identity, if this tuple is (or wraps
    /// exactly) a scanned record.
    ///
    /// Join and computed tuples have no single identity and return `None`.
    pub fn base_rid(&self) -> Option<(u32, Rid)> {
        match self {
            Tuple::Row { table_id, rid, .. } => Some((*table_id, *rid)),
            _ => None,
        }
    }
}
